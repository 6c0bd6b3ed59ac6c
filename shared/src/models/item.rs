//! Catalog item and bill-of-materials models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub codigo: String,
    pub descricao: String,
    pub familia: Option<String>,
    pub subfamilia: Option<String>,
    /// Sector tags the item is used by
    pub setores: Vec<String>,
    pub comprimento: Option<Decimal>,
    pub largura: Option<Decimal>,
    pub altura: Option<Decimal>,
    pub peso: Option<Decimal>,
    /// Unit of measure (e.g. "UN", "KG", "M")
    pub unidade: String,
    pub tipo_controle: Option<ControlType>,
    pub ativo: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How stock of an item is controlled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlType {
    /// Counted by quantity only
    Quantidade,
    /// Tracked per serial number
    NumeroSerie,
    /// Tracked per lot
    Lote,
}

impl ControlType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlType::Quantidade => "quantidade",
            ControlType::NumeroSerie => "numero_serie",
            ControlType::Lote => "lote",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "quantidade" => Some(ControlType::Quantidade),
            "numero_serie" => Some(ControlType::NumeroSerie),
            "lote" => Some(ControlType::Lote),
            _ => None,
        }
    }
}

/// One component line of a composite item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemComponent {
    pub id: Uuid,
    pub item_id: Uuid,
    pub componente_id: Uuid,
    pub quantidade: i32,
    /// Resolved from the catalog for display
    pub componente_codigo: String,
    pub componente_descricao: String,
}

/// Directed edge `item_id -> componente_id` of the component graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentEdge {
    pub item_id: Uuid,
    pub componente_id: Uuid,
}
