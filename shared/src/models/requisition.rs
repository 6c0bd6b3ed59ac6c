//! Requisition aggregate: header, lines and lifecycle status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A request to move items into a destination warehouse
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requisition {
    pub id: Uuid,
    pub armazem_origem_id: Option<Uuid>,
    pub armazem_id: Uuid,
    pub status: RequisitionStatus,
    pub observacoes: Option<String>,
    pub criado_por: Uuid,
    /// Requisition-level attestation that physical picking is complete
    pub separacao_confirmada: bool,
    pub separacao_confirmada_em: Option<DateTime<Utc>>,
    /// Bumped by every applied transition
    pub version: i32,
    pub itens: Vec<RequisitionItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Requisition {
    pub fn line_mut(&mut self, line_id: Uuid) -> Option<&mut RequisitionItem> {
        self.itens.iter_mut().find(|l| l.id == line_id)
    }

    /// Lines not yet explicitly picked
    pub fn unconfirmed_lines(&self) -> impl Iterator<Item = &RequisitionItem> {
        self.itens.iter().filter(|l| !l.preparacao_confirmada)
    }

    pub fn all_lines_confirmed(&self) -> bool {
        self.unconfirmed_lines().next().is_none()
    }
}

/// One line of a requisition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionItem {
    pub id: Uuid,
    pub requisicao_id: Uuid,
    pub item_id: Uuid,
    /// Requested quantity, always positive
    pub quantidade: i32,
    /// Set during picking; 0 means confirmed absent
    pub quantidade_preparada: Option<i32>,
    pub localizacao_origem: Option<String>,
    pub localizacao_destino: Option<String>,
    pub preparacao_confirmada: bool,
}

impl RequisitionItem {
    /// Quantity that actually ships
    pub fn shipped_quantity(&self) -> i32 {
        if self.preparacao_confirmada {
            self.quantidade_preparada.unwrap_or(0)
        } else {
            0
        }
    }

    pub fn is_short(&self) -> bool {
        self.preparacao_confirmada && self.shipped_quantity() < self.quantidade
    }
}

/// Lifecycle status of a requisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequisitionStatus {
    #[serde(rename = "pendente")]
    Pendente,
    #[serde(rename = "separado")]
    Separado,
    #[serde(rename = "EM EXPEDICAO")]
    EmExpedicao,
    #[serde(rename = "Entregue")]
    Entregue,
    #[serde(rename = "cancelada")]
    Cancelada,
}

impl RequisitionStatus {
    pub const ALL: [RequisitionStatus; 5] = [
        RequisitionStatus::Pendente,
        RequisitionStatus::Separado,
        RequisitionStatus::EmExpedicao,
        RequisitionStatus::Entregue,
        RequisitionStatus::Cancelada,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequisitionStatus::Pendente => "pendente",
            RequisitionStatus::Separado => "separado",
            RequisitionStatus::EmExpedicao => "EM EXPEDICAO",
            RequisitionStatus::Entregue => "Entregue",
            RequisitionStatus::Cancelada => "cancelada",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequisitionStatus::Entregue | RequisitionStatus::Cancelada)
    }

    /// Single-step edges of the lifecycle graph.
    ///
    /// pendente -> separado -> EM EXPEDICAO -> Entregue, and pendente -> cancelada.
    pub fn can_transition_to(&self, next: RequisitionStatus) -> bool {
        use RequisitionStatus::*;
        matches!(
            (self, next),
            (Pendente, Separado)
                | (Separado, EmExpedicao)
                | (EmExpedicao, Entregue)
                | (Pendente, Cancelada)
        )
    }
}

impl std::fmt::Display for RequisitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shipment document kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ManifestKind {
    /// Outbound transfer, issued once picking is attested
    Trfl,
    /// Arrival at the destination, issued after dispatch
    Tra,
}

impl ManifestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestKind::Trfl => "TRFL",
            ManifestKind::Tra => "TRA",
        }
    }
}

impl std::fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_db_text() {
        for status in RequisitionStatus::ALL {
            assert_eq!(RequisitionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RequisitionStatus::parse("EM_EXPEDICAO"), None);
    }

    #[test]
    fn test_status_serde_uses_legacy_labels() {
        let json = serde_json::to_string(&RequisitionStatus::EmExpedicao).unwrap();
        assert_eq!(json, "\"EM EXPEDICAO\"");
        let parsed: RequisitionStatus = serde_json::from_str("\"Entregue\"").unwrap();
        assert_eq!(parsed, RequisitionStatus::Entregue);
    }

    #[test]
    fn test_no_edges_leave_terminal_states() {
        for terminal in [RequisitionStatus::Entregue, RequisitionStatus::Cancelada] {
            assert!(terminal.is_terminal());
            for next in RequisitionStatus::ALL {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_cancel_only_from_pending() {
        for from in RequisitionStatus::ALL {
            let allowed = from.can_transition_to(RequisitionStatus::Cancelada);
            assert_eq!(allowed, from == RequisitionStatus::Pendente, "from {}", from);
        }
    }

    #[test]
    fn test_shipped_quantity_ignores_unconfirmed_lines() {
        let line = RequisitionItem {
            id: Uuid::new_v4(),
            requisicao_id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            quantidade: 5,
            quantidade_preparada: Some(3),
            localizacao_origem: None,
            localizacao_destino: None,
            preparacao_confirmada: false,
        };
        assert_eq!(line.shipped_quantity(), 0);
        assert!(!line.is_short());

        let confirmed = RequisitionItem {
            preparacao_confirmada: true,
            ..line
        };
        assert_eq!(confirmed.shipped_quantity(), 3);
        assert!(confirmed.is_short());
    }
}
