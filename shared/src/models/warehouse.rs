//! Warehouse and storage location models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed shipping-staging location every picked line is routed to
pub const EXPEDICAO: &str = "EXPEDICAO";

/// Suffix of the tool location derived for every vehicle
pub const TOOL_LOCATION_SUFFIX: &str = ".FERR";

/// A storage node: a central warehouse or a vehicle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: Uuid,
    pub codigo: String,
    pub descricao: Option<String>,
    pub tipo: WarehouseKind,
    pub ativo: bool,
    /// Ordered as persisted
    pub localizacoes: Vec<Location>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Warehouse {
    /// Location where inbound shipments are put away.
    ///
    /// Central warehouses use their first `recebimento` location, vehicles
    /// their base location.
    pub fn receiving_location(&self) -> Option<&Location> {
        let wanted = match self.tipo {
            WarehouseKind::Central => LocationKind::Recebimento,
            WarehouseKind::Viatura => LocationKind::Normal,
        };
        self.localizacoes
            .iter()
            .find(|l| l.tipo_localizacao == wanted)
    }
}

/// Kind of storage node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseKind {
    Central,
    Viatura,
}

impl WarehouseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarehouseKind::Central => "central",
            WarehouseKind::Viatura => "viatura",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "central" => Some(WarehouseKind::Central),
            "viatura" => Some(WarehouseKind::Viatura),
            _ => None,
        }
    }
}

impl std::fmt::Display for WarehouseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named slot inside a warehouse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub localizacao: String,
    pub tipo_localizacao: LocationKind,
}

impl Location {
    pub fn new(localizacao: impl Into<String>, tipo_localizacao: LocationKind) -> Self {
        Self {
            localizacao: localizacao.into(),
            tipo_localizacao,
        }
    }
}

/// Role a location plays inside its warehouse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocationKind {
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "recebimento")]
    Recebimento,
    #[serde(rename = "expedicao")]
    Expedicao,
    #[serde(rename = "FERR")]
    Ferr,
}

impl LocationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationKind::Normal => "normal",
            LocationKind::Recebimento => "recebimento",
            LocationKind::Expedicao => "expedicao",
            LocationKind::Ferr => "FERR",
        }
    }

    /// Strict parse used at the storage boundary
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(LocationKind::Normal),
            "recebimento" => Some(LocationKind::Recebimento),
            "expedicao" => Some(LocationKind::Expedicao),
            "FERR" => Some(LocationKind::Ferr),
            _ => None,
        }
    }

    /// Lenient parse for submitted central-warehouse tags.
    ///
    /// Anything other than `recebimento` or `expedicao` is `normal`.
    pub fn from_submitted_tag(tag: Option<&str>) -> Self {
        match tag.map(|t| t.trim().to_ascii_lowercase()).as_deref() {
            Some("recebimento") => LocationKind::Recebimento,
            Some("expedicao") | Some("expedição") => LocationKind::Expedicao,
            _ => LocationKind::Normal,
        }
    }
}

impl std::fmt::Display for LocationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warehouse(tipo: WarehouseKind, localizacoes: Vec<Location>) -> Warehouse {
        Warehouse {
            id: Uuid::new_v4(),
            codigo: "E".to_string(),
            descricao: None,
            tipo,
            ativo: true,
            localizacoes,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_submitted_tags_normalize() {
        assert_eq!(LocationKind::from_submitted_tag(Some("Recebimento")), LocationKind::Recebimento);
        assert_eq!(LocationKind::from_submitted_tag(Some(" expedicao ")), LocationKind::Expedicao);
        assert_eq!(LocationKind::from_submitted_tag(Some("FERR")), LocationKind::Normal);
        assert_eq!(LocationKind::from_submitted_tag(Some("prateleira")), LocationKind::Normal);
        assert_eq!(LocationKind::from_submitted_tag(None), LocationKind::Normal);
    }

    #[test]
    fn test_receiving_location_central() {
        let w = warehouse(
            WarehouseKind::Central,
            vec![
                Location::new("A1", LocationKind::Normal),
                Location::new("REC", LocationKind::Recebimento),
                Location::new(EXPEDICAO, LocationKind::Expedicao),
            ],
        );
        assert_eq!(w.receiving_location().map(|l| l.localizacao.as_str()), Some("REC"));
    }

    #[test]
    fn test_receiving_location_vehicle_is_base() {
        let w = warehouse(
            WarehouseKind::Viatura,
            vec![
                Location::new("V848", LocationKind::Normal),
                Location::new("V848.FERR", LocationKind::Ferr),
            ],
        );
        assert_eq!(w.receiving_location().map(|l| l.localizacao.as_str()), Some("V848"));
    }

    #[test]
    fn test_location_kind_serde_names() {
        let json = serde_json::to_string(&LocationKind::Ferr).unwrap();
        assert_eq!(json, "\"FERR\"");
        let kind: LocationKind = serde_json::from_str("\"recebimento\"").unwrap();
        assert_eq!(kind, LocationKind::Recebimento);
    }
}
