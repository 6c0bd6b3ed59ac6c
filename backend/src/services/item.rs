//! Item catalog and composite item (bill of materials) management

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use shared::{
    deserialize_clearable, deserialize_clearable_text, deserialize_non_blank,
    validate_acyclic_component, validate_item_code,
    validate_new_component, validate_positive_quantity, ComponentEdge, ControlType, Item,
    ItemComponent,
};

use crate::error::{is_foreign_key_violation, is_unique_violation, AppError, AppResult};

/// Item catalog service
#[derive(Clone)]
pub struct ItemService {
    db: PgPool,
}

/// Item with its derived composite flag
#[derive(Debug, Clone, Serialize)]
pub struct ItemView {
    #[serde(flatten)]
    pub item: Item,
    pub tem_componentes: bool,
}

/// Components of one item
#[derive(Debug, Clone, Serialize)]
pub struct ComponentList {
    pub item_id: Uuid,
    pub tem_componentes: bool,
    pub componentes: Vec<ItemComponent>,
}

fn validate_dimension(value: &Decimal) -> Result<(), validator::ValidationError> {
    if *value >= Decimal::ZERO {
        Ok(())
    } else {
        let mut err = validator::ValidationError::new("range");
        err.message = Some("Dimensions and weight cannot be negative".into());
        Err(err)
    }
}

fn default_unit() -> String {
    "UN".to_string()
}

/// Input for creating an item
#[derive(Debug, Deserialize, Validate)]
pub struct CreateItemInput {
    pub codigo: String,
    #[validate(length(min = 1, max = 255, message = "Description must be 1-255 characters"))]
    pub descricao: String,
    #[serde(default, deserialize_with = "deserialize_non_blank")]
    #[validate(length(max = 100))]
    pub familia: Option<String>,
    #[serde(default, deserialize_with = "deserialize_non_blank")]
    #[validate(length(max = 100))]
    pub subfamilia: Option<String>,
    #[serde(default)]
    pub setores: Vec<String>,
    #[validate(custom = "validate_dimension")]
    pub comprimento: Option<Decimal>,
    #[validate(custom = "validate_dimension")]
    pub largura: Option<Decimal>,
    #[validate(custom = "validate_dimension")]
    pub altura: Option<Decimal>,
    #[validate(custom = "validate_dimension")]
    pub peso: Option<Decimal>,
    #[serde(default = "default_unit")]
    #[validate(length(min = 1, max = 10, message = "Unit must be 1-10 characters"))]
    pub unidade: String,
    #[serde(default, deserialize_with = "deserialize_non_blank")]
    pub tipo_controle: Option<String>,
}

/// Input for updating an item.
///
/// Absent fields are left unchanged. Optional attributes are cleared by an
/// explicit `null` (or `""` for text).
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateItemInput {
    #[serde(default, deserialize_with = "deserialize_non_blank")]
    pub codigo: Option<String>,
    #[serde(default, deserialize_with = "deserialize_non_blank")]
    #[validate(length(max = 255))]
    pub descricao: Option<String>,
    #[serde(default, deserialize_with = "deserialize_clearable_text")]
    #[validate(length(max = 100))]
    pub familia: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_clearable_text")]
    #[validate(length(max = 100))]
    pub subfamilia: Option<Option<String>>,
    pub setores: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_clearable")]
    #[validate(custom = "validate_dimension")]
    pub comprimento: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "deserialize_clearable")]
    #[validate(custom = "validate_dimension")]
    pub largura: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "deserialize_clearable")]
    #[validate(custom = "validate_dimension")]
    pub altura: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "deserialize_clearable")]
    #[validate(custom = "validate_dimension")]
    pub peso: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "deserialize_non_blank")]
    #[validate(length(max = 10))]
    pub unidade: Option<String>,
    #[serde(default, deserialize_with = "deserialize_clearable_text")]
    pub tipo_controle: Option<Option<String>>,
    pub ativo: Option<bool>,
}

/// List filters
#[derive(Debug, Default, Deserialize)]
pub struct ItemFilter {
    /// Matches code or description
    #[serde(default, deserialize_with = "deserialize_non_blank")]
    pub q: Option<String>,
    pub ativo: Option<bool>,
}

/// Input for adding a component
#[derive(Debug, Deserialize)]
pub struct AddComponentInput {
    pub componente_id: Uuid,
    pub quantidade: i32,
}

/// Input for changing a component quantity
#[derive(Debug, Deserialize)]
pub struct UpdateComponentInput {
    pub quantidade: i32,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    codigo: String,
    descricao: String,
    familia: Option<String>,
    subfamilia: Option<String>,
    setores: Vec<String>,
    comprimento: Option<Decimal>,
    largura: Option<Decimal>,
    altura: Option<Decimal>,
    peso: Option<Decimal>,
    unidade: String,
    tipo_controle: Option<String>,
    ativo: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    tem_componentes: bool,
}

impl TryFrom<ItemRow> for ItemView {
    type Error = AppError;

    fn try_from(row: ItemRow) -> AppResult<Self> {
        let tipo_controle = match row.tipo_controle {
            Some(raw) => Some(ControlType::parse(&raw).ok_or_else(|| {
                AppError::DataIntegrity(format!(
                    "unknown control type {} for item {}",
                    raw, row.codigo
                ))
            })?),
            None => None,
        };

        Ok(ItemView {
            item: Item {
                id: row.id,
                codigo: row.codigo,
                descricao: row.descricao,
                familia: row.familia,
                subfamilia: row.subfamilia,
                setores: row.setores,
                comprimento: row.comprimento,
                largura: row.largura,
                altura: row.altura,
                peso: row.peso,
                unidade: row.unidade,
                tipo_controle,
                ativo: row.ativo,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            tem_componentes: row.tem_componentes,
        })
    }
}

const SELECT_ITEM: &str = r#"
    SELECT i.id, i.codigo, i.descricao, i.familia, i.subfamilia, i.setores,
           i.comprimento, i.largura, i.altura, i.peso, i.unidade, i.tipo_controle,
           i.ativo, i.created_at, i.updated_at,
           EXISTS (SELECT 1 FROM itens_componentes c WHERE c.item_id = i.id) AS tem_componentes
    FROM itens i
"#;

fn parse_control_type(raw: Option<&str>) -> AppResult<Option<ControlType>> {
    match raw {
        None => Ok(None),
        Some(raw) => ControlType::parse(raw)
            .map(Some)
            .ok_or_else(|| AppError::Validation {
                field: "tipo_controle".to_string(),
                message: format!("Unknown control type: {}", raw),
                message_pt: format!("Tipo de controle desconhecido: {}", raw),
            }),
    }
}

fn clean_sectors(setores: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(setores.len());
    for s in setores {
        let s = s.trim();
        if !s.is_empty() && !out.iter().any(|o| o.eq_ignore_ascii_case(s)) {
            out.push(s.to_string());
        }
    }
    out
}

fn map_write_error(e: sqlx::Error, codigo: Option<&str>) -> AppError {
    if is_unique_violation(&e) {
        let codigo = codigo.unwrap_or_default();
        AppError::Conflict {
            resource: "codigo".to_string(),
            message: format!("Item code {} already exists", codigo),
            message_pt: format!("Já existe um item com o código {}", codigo),
        }
    } else {
        AppError::DatabaseError(e)
    }
}

impl ItemService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list(&self, filter: ItemFilter) -> AppResult<Vec<ItemView>> {
        let pattern = filter.q.map(|q| format!("%{}%", q));

        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            r#"{}
            WHERE ($1::TEXT IS NULL OR i.codigo ILIKE $1 OR i.descricao ILIKE $1)
              AND ($2::BOOLEAN IS NULL OR i.ativo = $2)
            ORDER BY i.codigo
            "#,
            SELECT_ITEM
        ))
        .bind(pattern)
        .bind(filter.ativo)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(ItemView::try_from).collect()
    }

    pub async fn get(&self, id: Uuid) -> AppResult<ItemView> {
        let row = sqlx::query_as::<_, ItemRow>(&format!("{} WHERE i.id = $1", SELECT_ITEM))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Item".to_string()))?;

        row.try_into()
    }

    pub async fn create(&self, input: CreateItemInput) -> AppResult<ItemView> {
        input.validate()?;
        validate_item_code(&input.codigo)?;
        let codigo = input.codigo.trim().to_string();
        let tipo_controle = parse_control_type(input.tipo_controle.as_deref())?;
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO itens (id, codigo, descricao, familia, subfamilia, setores,
                               comprimento, largura, altura, peso, unidade, tipo_controle)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(id)
        .bind(&codigo)
        .bind(input.descricao.trim())
        .bind(&input.familia)
        .bind(&input.subfamilia)
        .bind(clean_sectors(input.setores))
        .bind(input.comprimento)
        .bind(input.largura)
        .bind(input.altura)
        .bind(input.peso)
        .bind(input.unidade.trim().to_uppercase())
        .bind(tipo_controle.map(|t| t.as_str()))
        .execute(&self.db)
        .await
        .map_err(|e| map_write_error(e, Some(&codigo)))?;

        tracing::info!(item_id = %id, codigo = %codigo, "item created");
        self.get(id).await
    }

    pub async fn update(&self, id: Uuid, input: UpdateItemInput) -> AppResult<ItemView> {
        input.validate()?;
        if let Some(codigo) = &input.codigo {
            validate_item_code(codigo)?;
        }
        let tipo_controle = match &input.tipo_controle {
            Some(raw) => Some(parse_control_type(raw.as_deref())?),
            None => None,
        };

        // Clearable columns bind a presence flag followed by the new value
        let result = sqlx::query(
            r#"
            UPDATE itens SET
                codigo = COALESCE($2, codigo),
                descricao = COALESCE($3, descricao),
                familia = CASE WHEN $4 THEN $5 ELSE familia END,
                subfamilia = CASE WHEN $6 THEN $7 ELSE subfamilia END,
                setores = COALESCE($8, setores),
                comprimento = CASE WHEN $9 THEN $10 ELSE comprimento END,
                largura = CASE WHEN $11 THEN $12 ELSE largura END,
                altura = CASE WHEN $13 THEN $14 ELSE altura END,
                peso = CASE WHEN $15 THEN $16 ELSE peso END,
                unidade = COALESCE($17, unidade),
                tipo_controle = CASE WHEN $18 THEN $19 ELSE tipo_controle END,
                ativo = COALESCE($20, ativo),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&input.codigo)
        .bind(&input.descricao)
        .bind(input.familia.is_some())
        .bind(input.familia.clone().flatten())
        .bind(input.subfamilia.is_some())
        .bind(input.subfamilia.clone().flatten())
        .bind(input.setores.clone().map(clean_sectors))
        .bind(input.comprimento.is_some())
        .bind(input.comprimento.flatten())
        .bind(input.largura.is_some())
        .bind(input.largura.flatten())
        .bind(input.altura.is_some())
        .bind(input.altura.flatten())
        .bind(input.peso.is_some())
        .bind(input.peso.flatten())
        .bind(input.unidade.as_ref().map(|u| u.to_uppercase()))
        .bind(tipo_controle.is_some())
        .bind(tipo_controle.flatten().map(|t| t.as_str()))
        .bind(input.ativo)
        .execute(&self.db)
        .await
        .map_err(|e| map_write_error(e, input.codigo.as_deref()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Item".to_string()));
        }

        tracing::info!(item_id = %id, "item updated");
        self.get(id).await
    }

    /// Fails while the item is requested by a requisition or used as a
    /// component of another item
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM itens WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    AppError::StateConflict {
                        current: "referenced".to_string(),
                        message: "Item is referenced by a requisition or a composite item"
                            .to_string(),
                        message_pt: "O item está vinculado a uma requisição ou a um item composto"
                            .to_string(),
                    }
                } else {
                    AppError::DatabaseError(e)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Item".to_string()));
        }

        tracing::info!(item_id = %id, "item deleted");
        Ok(())
    }

    // ========================================================================
    // Components
    // ========================================================================

    pub async fn has_components(&self, item_id: Uuid) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM itens_componentes WHERE item_id = $1)",
        )
        .bind(item_id)
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }

    pub async fn list_components(&self, item_id: Uuid) -> AppResult<ComponentList> {
        let mut conn = self.db.acquire().await?;
        ensure_item_exists(&mut conn, item_id).await?;
        let componentes = load_components(&mut conn, item_id).await?;
        let tem_componentes = self.has_components(item_id).await?;

        Ok(ComponentList {
            item_id,
            tem_componentes,
            componentes,
        })
    }

    pub async fn add_component(
        &self,
        item_id: Uuid,
        input: AddComponentInput,
    ) -> AppResult<ComponentList> {
        let mut tx = self.db.begin().await?;

        // Component writes are serialized so two concurrent additions cannot
        // close a cycle between them.
        sqlx::query("LOCK TABLE itens_componentes IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        ensure_item_exists(&mut tx, item_id).await?;
        ensure_item_exists(&mut tx, input.componente_id).await?;

        let current: Vec<Uuid> =
            sqlx::query_scalar("SELECT componente_id FROM itens_componentes WHERE item_id = $1")
                .bind(item_id)
                .fetch_all(&mut *tx)
                .await?;
        validate_new_component(item_id, input.componente_id, input.quantidade, &current)?;

        let edges = reachable_edges(&mut tx, input.componente_id).await?;
        validate_acyclic_component(item_id, input.componente_id, &edges)?;

        sqlx::query(
            r#"
            INSERT INTO itens_componentes (id, item_id, componente_id, quantidade)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(item_id)
        .bind(input.componente_id)
        .bind(input.quantidade)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            item_id = %item_id,
            componente_id = %input.componente_id,
            quantidade = input.quantidade,
            "component added"
        );
        self.list_components(item_id).await
    }

    pub async fn update_component_quantity(
        &self,
        item_id: Uuid,
        componente_id: Uuid,
        input: UpdateComponentInput,
    ) -> AppResult<ComponentList> {
        validate_positive_quantity("quantidade", input.quantidade)?;

        let result = sqlx::query(
            "UPDATE itens_componentes SET quantidade = $3 WHERE item_id = $1 AND componente_id = $2",
        )
        .bind(item_id)
        .bind(componente_id)
        .bind(input.quantidade)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Component".to_string()));
        }

        self.list_components(item_id).await
    }

    pub async fn remove_component(&self, item_id: Uuid, componente_id: Uuid) -> AppResult<()> {
        let result =
            sqlx::query("DELETE FROM itens_componentes WHERE item_id = $1 AND componente_id = $2")
                .bind(item_id)
                .bind(componente_id)
                .execute(&self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Component".to_string()));
        }

        tracing::info!(item_id = %item_id, componente_id = %componente_id, "component removed");
        Ok(())
    }
}

async fn ensure_item_exists(conn: &mut PgConnection, id: Uuid) -> AppResult<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM itens WHERE id = $1)")
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    if exists {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("Item {}", id)))
    }
}

async fn load_components(conn: &mut PgConnection, item_id: Uuid) -> AppResult<Vec<ItemComponent>> {
    let rows = sqlx::query_as::<_, (Uuid, Uuid, Uuid, i32, String, String)>(
        r#"
        SELECT c.id, c.item_id, c.componente_id, c.quantidade, i.codigo, i.descricao
        FROM itens_componentes c
        JOIN itens i ON i.id = c.componente_id
        WHERE c.item_id = $1
        ORDER BY i.codigo
        "#,
    )
    .bind(item_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| ItemComponent {
            id: r.0,
            item_id: r.1,
            componente_id: r.2,
            quantidade: r.3,
            componente_codigo: r.4,
            componente_descricao: r.5,
        })
        .collect())
}

/// Every component edge reachable from `start`
async fn reachable_edges(conn: &mut PgConnection, start: Uuid) -> AppResult<Vec<ComponentEdge>> {
    let rows = sqlx::query_as::<_, (Uuid, Uuid)>(
        r#"
        WITH RECURSIVE alcance (item_id, componente_id) AS (
            SELECT item_id, componente_id FROM itens_componentes WHERE item_id = $1
            UNION
            SELECT c.item_id, c.componente_id
            FROM itens_componentes c
            JOIN alcance a ON c.item_id = a.componente_id
        )
        SELECT item_id, componente_id FROM alcance
        "#,
    )
    .bind(start)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(item_id, componente_id)| ComponentEdge {
            item_id,
            componente_id,
        })
        .collect())
}

/// Load several catalog items by id
pub async fn fetch_many(
    conn: &mut PgConnection,
    ids: &[Uuid],
) -> AppResult<std::collections::HashMap<Uuid, Item>> {
    let rows = sqlx::query_as::<_, ItemRow>(&format!("{} WHERE i.id = ANY($1)", SELECT_ITEM))
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;

    rows.into_iter()
        .map(|row| ItemView::try_from(row).map(|v| (v.item.id, v.item)))
        .collect()
}
