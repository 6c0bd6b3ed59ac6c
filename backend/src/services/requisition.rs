//! Requisition lifecycle service
//!
//! Every transition runs in one transaction: the requisition row is locked
//! with `FOR UPDATE`, the pure guard from `shared::workflow` is evaluated on
//! the loaded aggregate, and only then are the changes written together with
//! a `version` bump. A rejected guard drops the transaction untouched.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use shared::{
    apply_export, cancel, complete_picking, confirm_picking, deserialize_non_blank,
    deserialize_optional_uuid, ensure_editable, pick_line, plan_export, validate_requisition_lines,
    Item, ManifestKind, NewLine, PickLine, Requisition, RequisitionItem, RequisitionStatus,
    Transition, Warehouse,
};

use super::manifest::{self, ManifestFile, ManifestFormat, ManifestInput};
use super::{item, warehouse, with_transition_retry};
use crate::error::{AppError, AppResult};

/// Requisition service
#[derive(Clone)]
pub struct RequisitionService {
    db: PgPool,
    retries: u32,
}

/// Body of create and update requests
#[derive(Debug, Clone, Deserialize)]
pub struct SaveRequisitionInput {
    #[serde(default, deserialize_with = "deserialize_optional_uuid")]
    pub armazem_origem_id: Option<Uuid>,
    #[serde(default, deserialize_with = "deserialize_optional_uuid")]
    pub armazem_id: Option<Uuid>,
    #[serde(default)]
    pub itens: Vec<NewLine>,
    #[serde(default, deserialize_with = "deserialize_non_blank")]
    pub observacoes: Option<String>,
}

/// List filters
#[derive(Debug, Default, Deserialize)]
pub struct RequisitionFilter {
    #[serde(default, deserialize_with = "deserialize_non_blank")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_uuid")]
    pub armazem_id: Option<Uuid>,
}

/// Row of the requisition list
#[derive(Debug, Clone, Serialize)]
pub struct RequisitionSummary {
    pub id: Uuid,
    pub armazem_origem_id: Option<Uuid>,
    pub armazem_origem_codigo: Option<String>,
    pub armazem_id: Uuid,
    pub armazem_codigo: String,
    pub status: RequisitionStatus,
    pub observacoes: Option<String>,
    pub criado_por: Uuid,
    pub separacao_confirmada: bool,
    pub total_itens: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Line with its catalog data resolved
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedLine {
    #[serde(flatten)]
    pub linha: RequisitionItem,
    pub item_codigo: Option<String>,
    pub item_descricao: Option<String>,
    pub unidade: Option<String>,
}

/// Requisition with warehouse codes and resolved lines
#[derive(Debug, Clone, Serialize)]
pub struct RequisitionView {
    pub id: Uuid,
    pub armazem_origem_id: Option<Uuid>,
    pub armazem_origem_codigo: Option<String>,
    pub armazem_id: Uuid,
    pub armazem_codigo: Option<String>,
    pub status: RequisitionStatus,
    pub observacoes: Option<String>,
    pub criado_por: Uuid,
    pub separacao_confirmada: bool,
    pub separacao_confirmada_em: Option<DateTime<Utc>>,
    pub version: i32,
    pub itens: Vec<ResolvedLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RequisitionView {
    fn resolve(
        req: Requisition,
        warehouses: &HashMap<Uuid, Warehouse>,
        items: &HashMap<Uuid, Item>,
    ) -> Self {
        let code_of = |id: Uuid| warehouses.get(&id).map(|w| w.codigo.clone());
        let itens = req
            .itens
            .into_iter()
            .map(|linha| {
                let item = items.get(&linha.item_id);
                ResolvedLine {
                    item_codigo: item.map(|i| i.codigo.clone()),
                    item_descricao: item.map(|i| i.descricao.clone()),
                    unidade: item.map(|i| i.unidade.clone()),
                    linha,
                }
            })
            .collect();

        RequisitionView {
            id: req.id,
            armazem_origem_codigo: req.armazem_origem_id.and_then(code_of),
            armazem_origem_id: req.armazem_origem_id,
            armazem_codigo: code_of(req.armazem_id),
            armazem_id: req.armazem_id,
            status: req.status,
            observacoes: req.observacoes,
            criado_por: req.criado_por,
            separacao_confirmada: req.separacao_confirmada,
            separacao_confirmada_em: req.separacao_confirmada_em,
            version: req.version,
            itens,
            created_at: req.created_at,
            updated_at: req.updated_at,
        }
    }
}

/// Result of an export call
#[derive(Debug)]
pub struct ExportOutcome {
    pub file: ManifestFile,
    pub status: RequisitionStatus,
    /// `None` when the document was re-issued
    pub transition: Option<Transition>,
}

#[derive(sqlx::FromRow)]
struct RequisitionRow {
    id: Uuid,
    armazem_origem_id: Option<Uuid>,
    armazem_id: Uuid,
    status: String,
    observacoes: Option<String>,
    criado_por: Uuid,
    separacao_confirmada: bool,
    separacao_confirmada_em: Option<DateTime<Utc>>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct LineRow {
    id: Uuid,
    requisicao_id: Uuid,
    item_id: Uuid,
    quantidade: i32,
    quantidade_preparada: Option<i32>,
    localizacao_origem: Option<String>,
    localizacao_destino: Option<String>,
    preparacao_confirmada: bool,
}

impl From<LineRow> for RequisitionItem {
    fn from(row: LineRow) -> Self {
        RequisitionItem {
            id: row.id,
            requisicao_id: row.requisicao_id,
            item_id: row.item_id,
            quantidade: row.quantidade,
            quantidade_preparada: row.quantidade_preparada,
            localizacao_origem: row.localizacao_origem,
            localizacao_destino: row.localizacao_destino,
            preparacao_confirmada: row.preparacao_confirmada,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: Uuid,
    armazem_origem_id: Option<Uuid>,
    armazem_origem_codigo: Option<String>,
    armazem_id: Uuid,
    armazem_codigo: String,
    status: String,
    observacoes: Option<String>,
    criado_por: Uuid,
    separacao_confirmada: bool,
    total_itens: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_stored_status(raw: &str, id: Uuid) -> AppResult<RequisitionStatus> {
    RequisitionStatus::parse(raw).ok_or_else(|| {
        AppError::DataIntegrity(format!("unknown status {} on requisition {}", raw, id))
    })
}

impl RequisitionService {
    pub fn new(db: PgPool, retries: u32) -> Self {
        Self { db, retries }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Newest first
    pub async fn list(&self, filter: RequisitionFilter) -> AppResult<Vec<RequisitionSummary>> {
        let status = match filter.status.as_deref() {
            None => None,
            Some(raw) => Some(RequisitionStatus::parse(raw).ok_or_else(|| {
                AppError::Validation {
                    field: "status".to_string(),
                    message: format!("Unknown requisition status: {}", raw),
                    message_pt: format!("Status de requisição desconhecido: {}", raw),
                }
            })?),
        };

        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT r.id, r.armazem_origem_id, o.codigo AS armazem_origem_codigo,
                   r.armazem_id, a.codigo AS armazem_codigo, r.status, r.observacoes,
                   r.criado_por, r.separacao_confirmada,
                   (SELECT COUNT(*) FROM requisicao_itens ri WHERE ri.requisicao_id = r.id) AS total_itens,
                   r.created_at, r.updated_at
            FROM requisicoes r
            JOIN armazens a ON a.id = r.armazem_id
            LEFT JOIN armazens o ON o.id = r.armazem_origem_id
            WHERE ($1::VARCHAR IS NULL OR r.status = $1)
              AND ($2::UUID IS NULL OR r.armazem_id = $2)
            ORDER BY r.created_at DESC
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(filter.armazem_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(RequisitionSummary {
                    status: parse_stored_status(&r.status, r.id)?,
                    id: r.id,
                    armazem_origem_id: r.armazem_origem_id,
                    armazem_origem_codigo: r.armazem_origem_codigo,
                    armazem_id: r.armazem_id,
                    armazem_codigo: r.armazem_codigo,
                    observacoes: r.observacoes,
                    criado_por: r.criado_por,
                    separacao_confirmada: r.separacao_confirmada,
                    total_itens: r.total_itens,
                    created_at: r.created_at,
                    updated_at: r.updated_at,
                })
            })
            .collect()
    }

    pub async fn get(&self, id: Uuid) -> AppResult<RequisitionView> {
        let mut conn = self.db.acquire().await?;
        let req = load(&mut conn, id, false).await?;
        let (warehouses, items) = resolve_references(&mut conn, &req).await?;
        Ok(RequisitionView::resolve(req, &warehouses, &items))
    }

    // ========================================================================
    // Create / Edit / Delete
    // ========================================================================

    pub async fn create(&self, criado_por: Uuid, input: SaveRequisitionInput) -> AppResult<Requisition> {
        let mut tx = self.db.begin().await?;
        check_references(&mut tx, &input).await?;

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO requisicoes (id, armazem_origem_id, armazem_id, status, observacoes, criado_por)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(input.armazem_origem_id)
        .bind(input.armazem_id)
        .bind(RequisitionStatus::Pendente.as_str())
        .bind(&input.observacoes)
        .bind(criado_por)
        .execute(&mut *tx)
        .await?;

        insert_lines(&mut tx, id, &input.itens).await?;
        let req = load(&mut tx, id, false).await?;
        tx.commit().await?;

        tracing::info!(
            requisicao_id = %id,
            criado_por = %criado_por,
            linhas = req.itens.len(),
            "requisition created"
        );
        Ok(req)
    }

    /// Replace destination, origin, notes and the full line set while
    /// `pendente`. Picking data of the old lines is discarded.
    pub async fn update(&self, id: Uuid, input: SaveRequisitionInput) -> AppResult<Requisition> {
        with_transition_retry(self.retries, || self.update_once(id, &input)).await
    }

    async fn update_once(&self, id: Uuid, input: &SaveRequisitionInput) -> AppResult<Requisition> {
        let mut tx = self.db.begin().await?;
        let mut req = load(&mut tx, id, true).await?;
        ensure_editable(&req)?;
        check_references(&mut tx, input).await?;

        sqlx::query(
            r#"
            UPDATE requisicoes
            SET armazem_origem_id = $2, armazem_id = $3, observacoes = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(input.armazem_origem_id)
        .bind(input.armazem_id)
        .bind(&input.observacoes)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM requisicao_itens WHERE requisicao_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        insert_lines(&mut tx, id, &input.itens).await?;
        save_header(&mut tx, &mut req).await?;

        let req = load(&mut tx, id, false).await?;
        tx.commit().await?;

        tracing::info!(requisicao_id = %id, version = req.version, "requisition updated");
        Ok(req)
    }

    /// Removes the requisition and its lines in any status
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM requisicoes WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Requisition".to_string()));
        }

        tracing::info!(requisicao_id = %id, "requisition deleted");
        Ok(())
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// atender-item
    pub async fn pick(&self, id: Uuid, pick: PickLine) -> AppResult<Requisition> {
        with_transition_retry(self.retries, || self.pick_once(id, &pick)).await
    }

    async fn pick_once(&self, id: Uuid, pick: &PickLine) -> AppResult<Requisition> {
        let mut tx = self.db.begin().await?;
        let mut req = load(&mut tx, id, true).await?;

        let line = pick_line(&mut req, pick)?;

        sqlx::query(
            r#"
            UPDATE requisicao_itens
            SET quantidade_preparada = $2,
                localizacao_origem = $3,
                localizacao_destino = $4,
                preparacao_confirmada = $5
            WHERE id = $1
            "#,
        )
        .bind(line.id)
        .bind(line.quantidade_preparada)
        .bind(&line.localizacao_origem)
        .bind(&line.localizacao_destino)
        .bind(line.preparacao_confirmada)
        .execute(&mut *tx)
        .await?;
        save_header(&mut tx, &mut req).await?;
        tx.commit().await?;

        tracing::info!(
            requisicao_id = %id,
            requisicao_item_id = %line.id,
            quantidade = line.quantidade,
            quantidade_preparada = ?line.quantidade_preparada,
            short = line.is_short(),
            "line picked"
        );
        Ok(req)
    }

    /// completar-separacao
    pub async fn complete_picking(&self, id: Uuid) -> AppResult<Requisition> {
        with_transition_retry(self.retries, || self.transition_once(id, "complete", |req| {
            complete_picking(req).map(Some)
        }))
        .await
    }

    /// confirmar-separacao
    pub async fn confirm_picking(&self, id: Uuid) -> AppResult<Requisition> {
        with_transition_retry(self.retries, || self.transition_once(id, "confirm", |req| {
            confirm_picking(req, Utc::now()).map(|_| None)
        }))
        .await
    }

    pub async fn cancel(&self, id: Uuid) -> AppResult<Requisition> {
        with_transition_retry(self.retries, || {
            self.transition_once(id, "cancel", |req| cancel(req).map(Some))
        })
        .await
    }

    /// Header-only transition: lock, guard, write, bump version
    async fn transition_once<G>(&self, id: Uuid, action: &'static str, guard: G) -> AppResult<Requisition>
    where
        G: FnOnce(&mut Requisition) -> Result<Option<Transition>, shared::WorkflowError>,
    {
        let mut tx = self.db.begin().await?;
        let mut req = load(&mut tx, id, true).await?;

        let transition = guard(&mut req)?;
        save_header(&mut tx, &mut req).await?;
        tx.commit().await?;

        log_transition(id, action, transition, &req);
        Ok(req)
    }

    /// export-trfl / export-tra.
    ///
    /// The manifest is rendered before any write; a rendering failure leaves
    /// the status unchanged. Re-exports regenerate the document without a
    /// transition.
    pub async fn export(
        &self,
        id: Uuid,
        kind: ManifestKind,
        format: ManifestFormat,
    ) -> AppResult<ExportOutcome> {
        with_transition_retry(self.retries, || self.export_once(id, kind, format)).await
    }

    async fn export_once(
        &self,
        id: Uuid,
        kind: ManifestKind,
        format: ManifestFormat,
    ) -> AppResult<ExportOutcome> {
        let mut tx = self.db.begin().await?;
        let mut req = load(&mut tx, id, true).await?;

        let decision = plan_export(&req, kind)?;

        let (warehouses, items) = resolve_references(&mut tx, &req).await?;
        let destination = warehouses
            .get(&req.armazem_id)
            .ok_or_else(|| AppError::DataIntegrity(format!("warehouse {} is missing", req.armazem_id)))?;
        let origin = req.armazem_origem_id.and_then(|o| warehouses.get(&o));

        let file = manifest::render(
            &ManifestInput {
                kind,
                requisition: &req,
                items: &items,
                origin,
                destination,
            },
            format,
        )?;

        let transition = apply_export(&mut req, decision);
        if transition.is_some() {
            save_header(&mut tx, &mut req).await?;
        }
        tx.commit().await?;

        match transition {
            Some(_) => log_transition(id, kind.as_str(), transition, &req),
            None => tracing::info!(
                requisicao_id = %id,
                manifesto = %kind,
                status = %req.status,
                "manifest re-issued"
            ),
        }

        Ok(ExportOutcome {
            file,
            status: req.status,
            transition,
        })
    }
}

fn log_transition(id: Uuid, action: &'static str, transition: Option<Transition>, req: &Requisition) {
    match transition {
        Some(t) => tracing::info!(
            requisicao_id = %id,
            action,
            from = %t.from,
            to = %t.to,
            version = req.version,
            "requisition transition"
        ),
        None => tracing::info!(
            requisicao_id = %id,
            action,
            status = %req.status,
            version = req.version,
            "requisition updated"
        ),
    }
}

// ============================================================================
// Storage helpers
// ============================================================================

fn select_header_sql(for_update: bool) -> String {
    format!(
        r#"
        SELECT id, armazem_origem_id, armazem_id, status, observacoes, criado_por,
               separacao_confirmada, separacao_confirmada_em, version, created_at, updated_at
        FROM requisicoes
        WHERE id = $1
        {}
        "#,
        if for_update { "FOR UPDATE" } else { "" }
    )
}

/// Load the aggregate, optionally locking the header row
async fn load(conn: &mut PgConnection, id: Uuid, for_update: bool) -> AppResult<Requisition> {
    let sql = select_header_sql(for_update);

    let row = sqlx::query_as::<_, RequisitionRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Requisition".to_string()))?;

    let lines = sqlx::query_as::<_, LineRow>(
        r#"
        SELECT id, requisicao_id, item_id, quantidade, quantidade_preparada,
               localizacao_origem, localizacao_destino, preparacao_confirmada
        FROM requisicao_itens
        WHERE requisicao_id = $1
        ORDER BY posicao
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Requisition {
        status: parse_stored_status(&row.status, row.id)?,
        id: row.id,
        armazem_origem_id: row.armazem_origem_id,
        armazem_id: row.armazem_id,
        observacoes: row.observacoes,
        criado_por: row.criado_por,
        separacao_confirmada: row.separacao_confirmada,
        separacao_confirmada_em: row.separacao_confirmada_em,
        version: row.version,
        itens: lines.into_iter().map(RequisitionItem::from).collect(),
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

/// Persist status and confirmation, bump `version`
async fn save_header(conn: &mut PgConnection, req: &mut Requisition) -> AppResult<()> {
    let (version, updated_at): (i32, DateTime<Utc>) = sqlx::query_as(
        r#"
        UPDATE requisicoes
        SET status = $2,
            separacao_confirmada = $3,
            separacao_confirmada_em = $4,
            version = version + 1,
            updated_at = NOW()
        WHERE id = $1
        RETURNING version, updated_at
        "#,
    )
    .bind(req.id)
    .bind(req.status.as_str())
    .bind(req.separacao_confirmada)
    .bind(req.separacao_confirmada_em)
    .fetch_one(&mut *conn)
    .await?;

    req.version = version;
    req.updated_at = updated_at;
    Ok(())
}

async fn insert_lines(conn: &mut PgConnection, requisicao_id: Uuid, lines: &[NewLine]) -> AppResult<()> {
    for (posicao, line) in lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO requisicao_itens (id, requisicao_id, posicao, item_id, quantidade)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(requisicao_id)
        .bind(posicao as i32)
        .bind(line.item_id)
        .bind(line.quantidade)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Shape checks, then every referenced warehouse and item must exist and be
/// active
async fn check_references(conn: &mut PgConnection, input: &SaveRequisitionInput) -> AppResult<()> {
    validate_requisition_lines(input.armazem_origem_id, input.armazem_id, &input.itens)?;

    let warehouse_ids: Vec<Uuid> = input
        .armazem_id
        .into_iter()
        .chain(input.armazem_origem_id)
        .collect();
    let warehouses = warehouse::fetch_many(conn, &warehouse_ids).await?;
    for (field, id) in [("armazem_id", input.armazem_id), ("armazem_origem_id", input.armazem_origem_id)] {
        let Some(id) = id else { continue };
        match warehouses.get(&id) {
            None => return Err(AppError::NotFound(format!("Warehouse {}", id))),
            Some(w) if !w.ativo => {
                return Err(AppError::Validation {
                    field: field.to_string(),
                    message: format!("Warehouse {} is inactive", w.codigo),
                    message_pt: format!("O armazém {} está inativo", w.codigo),
                })
            }
            Some(_) => {}
        }
    }

    let item_ids: Vec<Uuid> = input.itens.iter().map(|l| l.item_id).collect();
    let items = item::fetch_many(conn, &item_ids).await?;
    for (idx, line) in input.itens.iter().enumerate() {
        match items.get(&line.item_id) {
            None => return Err(AppError::NotFound(format!("Item {}", line.item_id))),
            Some(i) if !i.ativo => {
                return Err(AppError::Validation {
                    field: format!("itens[{}].item_id", idx),
                    message: format!("Item {} is inactive", i.codigo),
                    message_pt: format!("O item {} está inativo", i.codigo),
                })
            }
            Some(_) => {}
        }
    }

    Ok(())
}

async fn resolve_references(
    conn: &mut PgConnection,
    req: &Requisition,
) -> AppResult<(HashMap<Uuid, Warehouse>, HashMap<Uuid, Item>)> {
    let warehouse_ids: Vec<Uuid> = std::iter::once(req.armazem_id)
        .chain(req.armazem_origem_id)
        .collect();
    let warehouses = warehouse::fetch_many(&mut *conn, &warehouse_ids).await?;

    let item_ids: Vec<Uuid> = req.itens.iter().map(|l| l.item_id).collect();
    let items = item::fetch_many(&mut *conn, &item_ids).await?;

    Ok((warehouses, items))
}
