//! Requisition fulfillment workflow
//!
//! Pure guards and effects for every lifecycle transition:
//!
//! ```text
//! pendente -> separado -> EM EXPEDICAO -> Entregue
//!     \-> cancelada
//! ```
//!
//! Each function checks its guard before touching the aggregate, so a failed
//! call leaves the requisition exactly as it was. Callers persist the
//! mutated aggregate inside the same database transaction that loaded it.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ManifestKind, Requisition, RequisitionItem, RequisitionStatus, EXPEDICAO};
use crate::types::non_blank;
use crate::validation::{
    validate_max_length, validate_positive_quantity, validate_prepared_quantity, ValidationError,
    MAX_LOCATION_LEN,
};

/// Rejected transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Requisition line {0} not found")]
    LineNotFound(Uuid),

    #[error("{message}")]
    StateConflict {
        current: RequisitionStatus,
        message: String,
        message_pt: String,
    },
}

impl WorkflowError {
    fn conflict(
        current: RequisitionStatus,
        message: impl Into<String>,
        message_pt: impl Into<String>,
    ) -> Self {
        WorkflowError::StateConflict {
            current,
            message: message.into(),
            message_pt: message_pt.into(),
        }
    }
}

/// An applied status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: RequisitionStatus,
    pub to: RequisitionStatus,
}

fn advance(req: &mut Requisition, to: RequisitionStatus) -> Transition {
    debug_assert!(
        req.status.can_transition_to(to),
        "illegal edge {} -> {}",
        req.status,
        to
    );
    let transition = Transition {
        from: req.status,
        to,
    };
    req.status = to;
    transition
}

// ============================================================================
// Creation / Edition
// ============================================================================

/// One requested line
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewLine {
    pub item_id: Uuid,
    pub quantidade: i32,
}

/// Guard shared by create and update.
///
/// Item existence is checked by the caller against the catalog.
pub fn validate_requisition_lines(
    armazem_origem_id: Option<Uuid>,
    armazem_id: Option<Uuid>,
    lines: &[NewLine],
) -> Result<(), ValidationError> {
    let destination = armazem_id.ok_or_else(|| {
        ValidationError::new(
            "armazem_id",
            "Destination warehouse is required",
            "O armazém de destino é obrigatório",
        )
    })?;

    if armazem_origem_id == Some(destination) {
        return Err(ValidationError::new(
            "armazem_origem_id",
            "Origin and destination warehouses must differ",
            "Os armazéns de origem e destino devem ser diferentes",
        ));
    }

    if lines.is_empty() {
        return Err(ValidationError::new(
            "itens",
            "A requisition needs at least one item",
            "A requisição precisa de pelo menos um item",
        ));
    }

    let mut seen = HashSet::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        validate_positive_quantity(&format!("itens[{}].quantidade", idx), line.quantidade)?;
        if !seen.insert(line.item_id) {
            return Err(ValidationError::new(
                format!("itens[{}].item_id", idx),
                "Item appears more than once in the requisition",
                "O item aparece mais de uma vez na requisição",
            ));
        }
    }

    Ok(())
}

/// Lines and destination may only be edited while `pendente`
pub fn ensure_editable(req: &Requisition) -> Result<(), WorkflowError> {
    if req.status != RequisitionStatus::Pendente {
        return Err(WorkflowError::conflict(
            req.status,
            format!(
                "Requisition can only be edited while pendente (current: {})",
                req.status
            ),
            format!(
                "A requisição só pode ser editada enquanto pendente (atual: {})",
                req.status
            ),
        ));
    }
    Ok(())
}

// ============================================================================
// Picking
// ============================================================================

/// Pick request for one line
#[derive(Debug, Clone, Deserialize)]
pub struct PickLine {
    pub requisicao_item_id: Uuid,
    pub quantidade_preparada: i32,
    #[serde(default, deserialize_with = "crate::types::deserialize_non_blank")]
    pub localizacao_origem: Option<String>,
}

/// Record the picked quantity and origin of one line.
///
/// The destination is always `EXPEDICAO`. A prepared quantity of 0 confirms
/// the item as absent. Under-fulfillment is accepted.
pub fn pick_line(req: &mut Requisition, pick: &PickLine) -> Result<RequisitionItem, WorkflowError> {
    if !matches!(
        req.status,
        RequisitionStatus::Pendente | RequisitionStatus::Separado
    ) {
        return Err(WorkflowError::conflict(
            req.status,
            format!(
                "Lines can only be picked while the requisition is pendente or separado (current: {})",
                req.status
            ),
            format!(
                "Itens só podem ser separados com a requisição pendente ou separada (atual: {})",
                req.status
            ),
        ));
    }
    if req.separacao_confirmada {
        return Err(WorkflowError::conflict(
            req.status,
            "Picking was already confirmed for this requisition",
            "A separação desta requisição já foi confirmada",
        ));
    }

    let line = req
        .line_mut(pick.requisicao_item_id)
        .ok_or(WorkflowError::LineNotFound(pick.requisicao_item_id))?;

    validate_prepared_quantity(pick.quantidade_preparada, line.quantidade)?;

    let origin = non_blank(pick.localizacao_origem.clone()).ok_or_else(|| {
        ValidationError::new(
            "localizacao_origem",
            "Origin location is required",
            "A localização de origem é obrigatória",
        )
    })?;
    validate_max_length("localizacao_origem", &origin, MAX_LOCATION_LEN)?;

    line.quantidade_preparada = Some(pick.quantidade_preparada);
    line.localizacao_origem = Some(origin);
    line.localizacao_destino = Some(EXPEDICAO.to_string());
    line.preparacao_confirmada = true;

    Ok(line.clone())
}

/// Move to `separado` once every line has been explicitly picked
pub fn complete_picking(req: &mut Requisition) -> Result<Transition, WorkflowError> {
    if req.status != RequisitionStatus::Pendente {
        return Err(WorkflowError::conflict(
            req.status,
            format!(
                "Picking can only be completed while pendente (current: {})",
                req.status
            ),
            format!(
                "A separação só pode ser concluída enquanto pendente (atual: {})",
                req.status
            ),
        ));
    }

    if req.itens.is_empty() || !req.all_lines_confirmed() {
        let pending = req.unconfirmed_lines().count();
        return Err(WorkflowError::conflict(
            req.status,
            format!("{} line(s) have not been picked yet", pending),
            format!("{} item(ns) ainda não foram separados", pending),
        ));
    }

    Ok(advance(req, RequisitionStatus::Separado))
}

/// Requisition-level attestation that physical picking is complete
pub fn confirm_picking(req: &mut Requisition, at: DateTime<Utc>) -> Result<(), WorkflowError> {
    if req.status != RequisitionStatus::Separado {
        return Err(WorkflowError::conflict(
            req.status,
            format!(
                "Picking can only be confirmed while separado (current: {})",
                req.status
            ),
            format!(
                "A separação só pode ser confirmada com status separado (atual: {})",
                req.status
            ),
        ));
    }
    if req.separacao_confirmada {
        return Err(WorkflowError::conflict(
            req.status,
            "Picking was already confirmed",
            "A separação já foi confirmada",
        ));
    }

    req.separacao_confirmada = true;
    req.separacao_confirmada_em = Some(at);
    Ok(())
}

// ============================================================================
// Export
// ============================================================================

/// What a successful manifest export does to the requisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportDecision {
    /// First export: apply the transition after generation succeeds
    Advance(RequisitionStatus),
    /// Re-download; status unchanged
    Reissue,
}

/// Decide whether a manifest may be generated, without mutating anything
pub fn plan_export(req: &Requisition, kind: ManifestKind) -> Result<ExportDecision, WorkflowError> {
    use RequisitionStatus::*;

    match (kind, req.status) {
        (ManifestKind::Trfl, Separado) if req.separacao_confirmada => {
            Ok(ExportDecision::Advance(EmExpedicao))
        }
        (ManifestKind::Trfl, Separado) => Err(WorkflowError::conflict(
            req.status,
            "TRFL export requires picking to be confirmed first",
            "A exportação TRFL exige a confirmação da separação",
        )),
        (ManifestKind::Trfl, EmExpedicao | Entregue) => Ok(ExportDecision::Reissue),
        (ManifestKind::Trfl, current) => Err(WorkflowError::conflict(
            current,
            format!(
                "TRFL export requires status separado with confirmed picking (current: {})",
                current
            ),
            format!(
                "A exportação TRFL exige status separado com separação confirmada (atual: {})",
                current
            ),
        )),
        (ManifestKind::Tra, EmExpedicao) => Ok(ExportDecision::Advance(Entregue)),
        (ManifestKind::Tra, Entregue) => Ok(ExportDecision::Reissue),
        (ManifestKind::Tra, current) => Err(WorkflowError::conflict(
            current,
            format!("TRA export requires status EM EXPEDICAO (current: {})", current),
            format!("A exportação TRA exige status EM EXPEDICAO (atual: {})", current),
        )),
    }
}

/// Apply a planned export after the document was generated
pub fn apply_export(req: &mut Requisition, decision: ExportDecision) -> Option<Transition> {
    match decision {
        ExportDecision::Advance(to) => Some(advance(req, to)),
        ExportDecision::Reissue => None,
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Cancel a requisition that has not been picked yet
pub fn cancel(req: &mut Requisition) -> Result<Transition, WorkflowError> {
    if req.status != RequisitionStatus::Pendente {
        return Err(WorkflowError::conflict(
            req.status,
            format!(
                "Only pendente requisitions can be cancelled (current: {})",
                req.status
            ),
            format!(
                "Apenas requisições pendentes podem ser canceladas (atual: {})",
                req.status
            ),
        ));
    }
    Ok(advance(req, RequisitionStatus::Cancelada))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requisition(quantities: &[i32]) -> Requisition {
        let id = Uuid::new_v4();
        Requisition {
            id,
            armazem_origem_id: None,
            armazem_id: Uuid::new_v4(),
            status: RequisitionStatus::Pendente,
            observacoes: None,
            criado_por: Uuid::new_v4(),
            separacao_confirmada: false,
            separacao_confirmada_em: None,
            version: 0,
            itens: quantities
                .iter()
                .map(|&quantidade| RequisitionItem {
                    id: Uuid::new_v4(),
                    requisicao_id: id,
                    item_id: Uuid::new_v4(),
                    quantidade,
                    quantidade_preparada: None,
                    localizacao_origem: None,
                    localizacao_destino: None,
                    preparacao_confirmada: false,
                })
                .collect(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn pick(req: &Requisition, idx: usize, qty: i32) -> PickLine {
        PickLine {
            requisicao_item_id: req.itens[idx].id,
            quantidade_preparada: qty,
            localizacao_origem: Some("V848".to_string()),
        }
    }

    #[test]
    fn test_scenario_pick_then_complete() {
        let mut req = requisition(&[5]);
        let p = pick(&req, 0, 5);

        let line = pick_line(&mut req, &p).unwrap();
        assert!(line.preparacao_confirmada);
        assert_eq!(line.localizacao_destino.as_deref(), Some(EXPEDICAO));
        assert_eq!(line.localizacao_origem.as_deref(), Some("V848"));

        let t = complete_picking(&mut req).unwrap();
        assert_eq!(t.from, RequisitionStatus::Pendente);
        assert_eq!(t.to, RequisitionStatus::Separado);
        assert_eq!(req.status, RequisitionStatus::Separado);
    }

    #[test]
    fn test_scenario_confirm_then_export_trfl() {
        let mut req = requisition(&[5]);
        let p = pick(&req, 0, 5);
        pick_line(&mut req, &p).unwrap();
        complete_picking(&mut req).unwrap();

        confirm_picking(&mut req, Utc::now()).unwrap();
        assert!(req.separacao_confirmada);
        assert!(req.separacao_confirmada_em.is_some());

        let decision = plan_export(&req, ManifestKind::Trfl).unwrap();
        let t = apply_export(&mut req, decision).unwrap();
        assert_eq!(t.to, RequisitionStatus::EmExpedicao);
    }

    #[test]
    fn test_scenario_tra_before_trfl_is_conflict() {
        let mut req = requisition(&[5]);
        let p = pick(&req, 0, 5);
        pick_line(&mut req, &p).unwrap();
        complete_picking(&mut req).unwrap();

        let err = plan_export(&req, ManifestKind::Tra).unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict { .. }));
        assert!(err.to_string().contains("EM EXPEDICAO"));
        assert_eq!(req.status, RequisitionStatus::Separado);
    }

    #[test]
    fn test_scenario_over_pick_is_rejected_without_mutation() {
        let mut req = requisition(&[5]);
        let before = req.itens[0].clone();
        let p = pick(&req, 0, 10);

        let err = pick_line(&mut req, &p).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert_eq!(req.itens[0], before);
        assert!(!req.itens[0].preparacao_confirmada);
    }

    #[test]
    fn test_zero_pick_confirms_absence() {
        let mut req = requisition(&[5, 2]);
        let first = pick(&req, 0, 0);
        let second = pick(&req, 1, 2);
        pick_line(&mut req, &first).unwrap();
        pick_line(&mut req, &second).unwrap();
        assert_eq!(req.itens[0].quantidade_preparada, Some(0));
        assert!(complete_picking(&mut req).is_ok());
    }

    #[test]
    fn test_complete_with_unpicked_line_is_conflict() {
        let mut req = requisition(&[5, 3]);
        let p = pick(&req, 0, 5);
        pick_line(&mut req, &p).unwrap();

        let err = complete_picking(&mut req).unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict { .. }));
        assert_eq!(req.status, RequisitionStatus::Pendente);
    }

    #[test]
    fn test_pick_requires_origin_location() {
        let mut req = requisition(&[5]);
        let mut p = pick(&req, 0, 5);
        p.localizacao_origem = Some("   ".to_string());
        let err = pick_line(&mut req, &p).unwrap_err();
        match err {
            WorkflowError::Validation(v) => assert_eq!(v.field, "localizacao_origem"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_overlong_origin_rejected_without_mutation() {
        let mut req = requisition(&[5]);
        let before = req.itens[0].clone();
        let mut p = pick(&req, 0, 5);
        p.localizacao_origem = Some("A".repeat(MAX_LOCATION_LEN + 50));

        let err = pick_line(&mut req, &p).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(ref v) if v.field == "localizacao_origem"));
        assert_eq!(req.itens[0], before);

        p.localizacao_origem = Some("A".repeat(MAX_LOCATION_LEN));
        assert!(pick_line(&mut req, &p).is_ok());
    }

    #[test]
    fn test_pick_unknown_line() {
        let mut req = requisition(&[5]);
        let p = PickLine {
            requisicao_item_id: Uuid::new_v4(),
            quantidade_preparada: 1,
            localizacao_origem: Some("A1".to_string()),
        };
        assert!(matches!(
            pick_line(&mut req, &p),
            Err(WorkflowError::LineNotFound(_))
        ));
    }

    #[test]
    fn test_repick_allowed_while_separado_until_confirmed() {
        let mut req = requisition(&[5]);
        let p = pick(&req, 0, 5);
        pick_line(&mut req, &p).unwrap();
        complete_picking(&mut req).unwrap();

        let again = pick(&req, 0, 4);
        pick_line(&mut req, &again).unwrap();
        assert_eq!(req.itens[0].quantidade_preparada, Some(4));

        confirm_picking(&mut req, Utc::now()).unwrap();
        let late = pick(&req, 0, 3);
        assert!(pick_line(&mut req, &late).is_err());
        assert_eq!(req.itens[0].quantidade_preparada, Some(4));
    }

    #[test]
    fn test_trfl_without_confirmation_is_conflict() {
        let mut req = requisition(&[1]);
        let p = pick(&req, 0, 1);
        pick_line(&mut req, &p).unwrap();
        complete_picking(&mut req).unwrap();
        assert!(plan_export(&req, ManifestKind::Trfl).is_err());
    }

    #[test]
    fn test_reexport_does_not_transition() {
        let mut req = requisition(&[1]);
        let p = pick(&req, 0, 1);
        pick_line(&mut req, &p).unwrap();
        complete_picking(&mut req).unwrap();
        confirm_picking(&mut req, Utc::now()).unwrap();
        let d = plan_export(&req, ManifestKind::Trfl).unwrap();
        apply_export(&mut req, d);

        assert_eq!(plan_export(&req, ManifestKind::Trfl), Ok(ExportDecision::Reissue));

        let d = plan_export(&req, ManifestKind::Tra).unwrap();
        assert_eq!(apply_export(&mut req, d).map(|t| t.to), Some(RequisitionStatus::Entregue));

        assert_eq!(plan_export(&req, ManifestKind::Tra), Ok(ExportDecision::Reissue));
        assert_eq!(plan_export(&req, ManifestKind::Trfl), Ok(ExportDecision::Reissue));
        assert_eq!(req.status, RequisitionStatus::Entregue);
    }

    #[test]
    fn test_confirm_twice_is_conflict() {
        let mut req = requisition(&[1]);
        let p = pick(&req, 0, 1);
        pick_line(&mut req, &p).unwrap();
        complete_picking(&mut req).unwrap();
        confirm_picking(&mut req, Utc::now()).unwrap();
        assert!(confirm_picking(&mut req, Utc::now()).is_err());
    }

    #[test]
    fn test_cancel_only_pending() {
        let mut req = requisition(&[1]);
        assert_eq!(cancel(&mut req).unwrap().to, RequisitionStatus::Cancelada);
        assert!(cancel(&mut req).is_err());
        let p = pick(&req, 0, 1);
        assert!(pick_line(&mut req, &p).is_err());
        assert!(ensure_editable(&req).is_err());
    }

    #[test]
    fn test_validate_lines() {
        let dest = Uuid::new_v4();
        let item = Uuid::new_v4();
        let ok = [NewLine { item_id: item, quantidade: 5 }];
        assert!(validate_requisition_lines(None, Some(dest), &ok).is_ok());
        assert_eq!(
            validate_requisition_lines(None, None, &ok).unwrap_err().field,
            "armazem_id"
        );
        assert!(validate_requisition_lines(Some(dest), Some(dest), &ok).is_err());
        assert!(validate_requisition_lines(None, Some(dest), &[]).is_err());

        let zero = [NewLine { item_id: item, quantidade: 0 }];
        assert_eq!(
            validate_requisition_lines(None, Some(dest), &zero).unwrap_err().field,
            "itens[0].quantidade"
        );

        let dup = [
            NewLine { item_id: item, quantidade: 1 },
            NewLine { item_id: item, quantidade: 2 },
        ];
        assert!(validate_requisition_lines(None, Some(dest), &dup).is_err());
    }
}
