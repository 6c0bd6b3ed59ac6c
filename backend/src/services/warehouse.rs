//! Warehouse and location storage

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use shared::{
    normalize_warehouse, Location, LocationKind, NormalizedWarehouse, Warehouse, WarehouseInput,
    WarehouseKind,
};

use crate::error::{is_foreign_key_violation, is_unique_violation, AppError, AppResult};

/// Warehouse service
#[derive(Clone)]
pub struct WarehouseService {
    db: PgPool,
}

/// Body of create and update requests
#[derive(Debug, Deserialize)]
pub struct SaveWarehouseInput {
    #[serde(flatten)]
    pub armazem: WarehouseInput,
    #[serde(default)]
    pub ativo: Option<bool>,
}

/// List filters
#[derive(Debug, Default, Deserialize)]
pub struct WarehouseFilter {
    pub tipo: Option<String>,
    pub ativo: Option<bool>,
}

#[derive(sqlx::FromRow)]
struct WarehouseRow {
    id: Uuid,
    codigo: String,
    descricao: Option<String>,
    tipo: String,
    ativo: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct LocationRow {
    armazem_id: Uuid,
    localizacao: String,
    tipo_localizacao: String,
}

const SELECT_WAREHOUSE: &str = r#"
    SELECT id, codigo, descricao, tipo, ativo, created_at, updated_at
    FROM armazens
"#;

impl WarehouseService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list(&self, filter: WarehouseFilter) -> AppResult<Vec<Warehouse>> {
        let tipo = match filter.tipo.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                WarehouseKind::parse(raw).ok_or_else(|| AppError::Validation {
                    field: "tipo".to_string(),
                    message: format!("Unknown warehouse type: {}", raw),
                    message_pt: format!("Tipo de armazém desconhecido: {}", raw),
                })?,
            ),
        };

        let rows = sqlx::query_as::<_, WarehouseRow>(&format!(
            r#"{}
            WHERE ($1::VARCHAR IS NULL OR tipo = $1)
              AND ($2::BOOLEAN IS NULL OR ativo = $2)
            ORDER BY codigo
            "#,
            SELECT_WAREHOUSE
        ))
        .bind(tipo.map(|t| t.as_str()))
        .bind(filter.ativo)
        .fetch_all(&self.db)
        .await?;

        let mut conn = self.db.acquire().await?;
        attach_locations(&mut conn, rows).await
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Warehouse> {
        let mut conn = self.db.acquire().await?;
        fetch(&mut conn, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Warehouse".to_string()))
    }

    pub async fn create(&self, input: SaveWarehouseInput) -> AppResult<Warehouse> {
        let normalized = normalize_warehouse(input.armazem)?;
        let id = Uuid::new_v4();

        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO armazens (id, codigo, descricao, tipo, ativo)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(&normalized.codigo)
        .bind(&normalized.descricao)
        .bind(normalized.tipo.as_str())
        .bind(input.ativo.unwrap_or(true))
        .execute(&mut *tx)
        .await
        .map_err(|e| duplicate_code(e, &normalized.codigo))?;

        replace_locations(&mut tx, id, &normalized.localizacoes).await?;

        let warehouse = fetch(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::Internal("warehouse vanished after insert".to_string()))?;

        tx.commit().await?;

        tracing::info!(armazem_id = %id, codigo = %warehouse.codigo, tipo = %warehouse.tipo, "warehouse created");
        Ok(warehouse)
    }

    /// Replace code, description, type and the full location list
    pub async fn update(&self, id: Uuid, input: SaveWarehouseInput) -> AppResult<Warehouse> {
        let NormalizedWarehouse {
            codigo,
            descricao,
            tipo,
            localizacoes,
        } = normalize_warehouse(input.armazem)?;

        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE armazens
            SET codigo = $2,
                descricao = $3,
                tipo = $4,
                ativo = COALESCE($5, ativo),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&codigo)
        .bind(&descricao)
        .bind(tipo.as_str())
        .bind(input.ativo)
        .execute(&mut *tx)
        .await
        .map_err(|e| duplicate_code(e, &codigo))?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound("Warehouse".to_string()));
        }

        replace_locations(&mut tx, id, &localizacoes).await?;

        let warehouse = fetch(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Warehouse".to_string()))?;

        tx.commit().await?;

        tracing::info!(armazem_id = %id, "warehouse updated");
        Ok(warehouse)
    }

    /// Fails while any requisition references the warehouse
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM armazens WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    AppError::Conflict {
                        resource: "armazem".to_string(),
                        message: "Warehouse is referenced by requisitions".to_string(),
                        message_pt: "O armazém está vinculado a requisições".to_string(),
                    }
                } else {
                    AppError::DatabaseError(e)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Warehouse".to_string()));
        }

        tracing::info!(armazem_id = %id, "warehouse deleted");
        Ok(())
    }
}

fn duplicate_code(e: sqlx::Error, codigo: &str) -> AppError {
    if is_unique_violation(&e) {
        AppError::Conflict {
            resource: "codigo".to_string(),
            message: format!("Warehouse code {} already exists", codigo),
            message_pt: format!("Já existe um armazém com o código {}", codigo),
        }
    } else {
        AppError::DatabaseError(e)
    }
}

async fn replace_locations(
    conn: &mut PgConnection,
    armazem_id: Uuid,
    localizacoes: &[Location],
) -> AppResult<()> {
    sqlx::query("DELETE FROM armazem_localizacoes WHERE armazem_id = $1")
        .bind(armazem_id)
        .execute(&mut *conn)
        .await?;

    for (posicao, loc) in localizacoes.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO armazem_localizacoes (id, armazem_id, posicao, localizacao, tipo_localizacao)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(armazem_id)
        .bind(posicao as i32)
        .bind(&loc.localizacao)
        .bind(loc.tipo_localizacao.as_str())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Load one warehouse with its locations
pub async fn fetch(conn: &mut PgConnection, id: Uuid) -> AppResult<Option<Warehouse>> {
    let row = sqlx::query_as::<_, WarehouseRow>(&format!("{} WHERE id = $1", SELECT_WAREHOUSE))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok(attach_locations(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Load several warehouses by id; missing ids are simply absent from the map
pub async fn fetch_many(
    conn: &mut PgConnection,
    ids: &[Uuid],
) -> AppResult<HashMap<Uuid, Warehouse>> {
    let rows = sqlx::query_as::<_, WarehouseRow>(&format!(
        "{} WHERE id = ANY($1)",
        SELECT_WAREHOUSE
    ))
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;

    Ok(attach_locations(conn, rows)
        .await?
        .into_iter()
        .map(|w| (w.id, w))
        .collect())
}

async fn attach_locations(
    conn: &mut PgConnection,
    rows: Vec<WarehouseRow>,
) -> AppResult<Vec<Warehouse>> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

    let location_rows = sqlx::query_as::<_, LocationRow>(
        r#"
        SELECT armazem_id, localizacao, tipo_localizacao
        FROM armazem_localizacoes
        WHERE armazem_id = ANY($1)
        ORDER BY armazem_id, posicao
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_warehouse: HashMap<Uuid, Vec<Location>> = HashMap::new();
    for loc in location_rows {
        let kind = LocationKind::parse(&loc.tipo_localizacao).ok_or_else(|| {
            AppError::DataIntegrity(format!(
                "unknown location type {} in warehouse {}",
                loc.tipo_localizacao, loc.armazem_id
            ))
        })?;
        by_warehouse
            .entry(loc.armazem_id)
            .or_default()
            .push(Location::new(loc.localizacao, kind));
    }

    rows.into_iter()
        .map(|row| {
            let tipo = WarehouseKind::parse(&row.tipo).ok_or_else(|| {
                AppError::DataIntegrity(format!(
                    "unknown warehouse type {} for {}",
                    row.tipo, row.codigo
                ))
            })?;
            Ok(Warehouse {
                localizacoes: by_warehouse.remove(&row.id).unwrap_or_default(),
                id: row.id,
                codigo: row.codigo,
                descricao: row.descricao,
                tipo,
                ativo: row.ativo,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
        })
        .collect()
}
