//! Validation utilities for the Almox warehouse platform
//!
//! Warehouse/location normalization, quantity rules and composite item
//! (bill of materials) checks. Pure functions, shared with the browser client.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ComponentEdge, Location, LocationKind, WarehouseKind, TOOL_LOCATION_SUFFIX};

/// Rule-violating input, reported against one field
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub message_pt: String,
}

impl ValidationError {
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        message_pt: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            message_pt: message_pt.into(),
        }
    }
}

// ============================================================================
// Warehouse / Location Validations
// ============================================================================

/// Column limits of the warehouse and picking tables, in characters
pub const MAX_WAREHOUSE_CODE_LEN: usize = 50;
pub const MAX_LOCATION_LEN: usize = 100;

/// Reject values longer than `max` characters
pub fn validate_max_length(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::new(
            field,
            format!("Must be at most {} characters", max),
            format!("Deve ter no máximo {} caracteres", max),
        ));
    }
    Ok(())
}

/// Warehouse payload as submitted by the client
#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseInput {
    pub codigo: String,
    #[serde(default, deserialize_with = "crate::types::deserialize_non_blank")]
    pub descricao: Option<String>,
    pub tipo: WarehouseKind,
    #[serde(default)]
    pub localizacoes: Vec<LocationInput>,
}

/// Submitted location; the tag is free text and normalized later
#[derive(Debug, Clone, Deserialize)]
pub struct LocationInput {
    #[serde(default)]
    pub localizacao: String,
    #[serde(default)]
    pub tipo_localizacao: Option<String>,
}

/// Warehouse ready for persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedWarehouse {
    pub codigo: String,
    pub descricao: Option<String>,
    pub tipo: WarehouseKind,
    pub localizacoes: Vec<Location>,
}

/// Derive the two fixed locations of a vehicle
pub fn vehicle_locations(codigo: &str) -> Vec<Location> {
    let base = codigo.trim().to_uppercase();
    let tools = format!("{}{}", base, TOOL_LOCATION_SUFFIX);
    vec![
        Location::new(base, LocationKind::Normal),
        Location::new(tools, LocationKind::Ferr),
    ]
}

/// Validate and normalize a warehouse create/update payload.
///
/// Vehicles ignore the submitted locations. Central warehouses need at least
/// one `recebimento` and one `expedicao` location after empty entries are
/// dropped; any other tag becomes `normal`.
pub fn normalize_warehouse(input: WarehouseInput) -> Result<NormalizedWarehouse, ValidationError> {
    let codigo = input.codigo.trim().to_string();
    if codigo.is_empty() {
        return Err(ValidationError::new(
            "codigo",
            "Warehouse code is required",
            "O código do armazém é obrigatório",
        ));
    }
    validate_max_length("codigo", &codigo, MAX_WAREHOUSE_CODE_LEN)?;

    let localizacoes = match input.tipo {
        WarehouseKind::Viatura => vehicle_locations(&codigo),
        WarehouseKind::Central => normalize_central_locations(input.localizacoes)?,
    };

    Ok(NormalizedWarehouse {
        codigo,
        descricao: input.descricao,
        tipo: input.tipo,
        localizacoes,
    })
}

fn normalize_central_locations(
    submitted: Vec<LocationInput>,
) -> Result<Vec<Location>, ValidationError> {
    let mut seen = HashSet::new();
    let mut locations = Vec::with_capacity(submitted.len());

    for entry in submitted {
        let name = entry.localizacao.trim();
        if name.is_empty() {
            continue;
        }
        validate_max_length("localizacoes", name, MAX_LOCATION_LEN)?;
        if !seen.insert(name.to_uppercase()) {
            return Err(ValidationError::new(
                "localizacoes",
                format!("Location {} is listed more than once", name),
                format!("A localização {} foi informada mais de uma vez", name),
            ));
        }
        let kind = LocationKind::from_submitted_tag(entry.tipo_localizacao.as_deref());
        locations.push(Location::new(name, kind));
    }

    let has = |kind: LocationKind| locations.iter().any(|l| l.tipo_localizacao == kind);

    if !has(LocationKind::Recebimento) {
        return Err(ValidationError::new(
            "localizacoes",
            "A central warehouse needs at least one receiving (recebimento) location",
            "Um armazém central precisa de pelo menos uma localização de recebimento",
        ));
    }
    if !has(LocationKind::Expedicao) {
        return Err(ValidationError::new(
            "localizacoes",
            "A central warehouse needs at least one shipping (expedicao) location",
            "Um armazém central precisa de pelo menos uma localização de expedição",
        ));
    }

    Ok(locations)
}

// ============================================================================
// Quantity Validations
// ============================================================================

/// Requested or component quantities must be positive integers
pub fn validate_positive_quantity(field: &str, quantity: i32) -> Result<(), ValidationError> {
    if quantity <= 0 {
        return Err(ValidationError::new(
            field,
            "Quantity must be a positive integer",
            "A quantidade deve ser um número inteiro positivo",
        ));
    }
    Ok(())
}

/// Prepared quantity must satisfy `0 <= prepared <= requested`
pub fn validate_prepared_quantity(prepared: i32, requested: i32) -> Result<(), ValidationError> {
    if prepared < 0 {
        return Err(ValidationError::new(
            "quantidade_preparada",
            "Prepared quantity cannot be negative",
            "A quantidade preparada não pode ser negativa",
        ));
    }
    if prepared > requested {
        return Err(ValidationError::new(
            "quantidade_preparada",
            format!(
                "Prepared quantity {} exceeds requested quantity {}",
                prepared, requested
            ),
            format!(
                "A quantidade preparada {} excede a quantidade solicitada {}",
                prepared, requested
            ),
        ));
    }
    Ok(())
}

// ============================================================================
// Composite Item Validations
// ============================================================================

/// Validate a new component line against the item's current components
pub fn validate_new_component(
    item_id: Uuid,
    componente_id: Uuid,
    quantidade: i32,
    current_components: &[Uuid],
) -> Result<(), ValidationError> {
    if item_id == componente_id {
        return Err(ValidationError::new(
            "componente_id",
            "An item cannot be a component of itself",
            "Um item não pode ser componente de si mesmo",
        ));
    }
    if current_components.contains(&componente_id) {
        return Err(ValidationError::new(
            "componente_id",
            "This item is already a component",
            "Este item já é um componente",
        ));
    }
    validate_positive_quantity("quantidade", quantidade)
}

/// Whether adding `item_id -> componente_id` closes a cycle.
///
/// `edges` must contain every edge reachable from `componente_id`.
pub fn creates_cycle(item_id: Uuid, componente_id: Uuid, edges: &[ComponentEdge]) -> bool {
    if item_id == componente_id {
        return true;
    }

    let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for edge in edges {
        children.entry(edge.item_id).or_default().push(edge.componente_id);
    }

    let mut visited = HashSet::new();
    let mut stack = vec![componente_id];
    while let Some(node) = stack.pop() {
        if node == item_id {
            return true;
        }
        if !visited.insert(node) {
            continue;
        }
        if let Some(next) = children.get(&node) {
            stack.extend(next.iter().copied());
        }
    }
    false
}

/// Reject a component that would make the graph cyclic
pub fn validate_acyclic_component(
    item_id: Uuid,
    componente_id: Uuid,
    edges: &[ComponentEdge],
) -> Result<(), ValidationError> {
    if creates_cycle(item_id, componente_id, edges) {
        return Err(ValidationError::new(
            "componente_id",
            "The component already contains this item (directly or indirectly)",
            "O componente já contém este item (direta ou indiretamente)",
        ));
    }
    Ok(())
}

// ============================================================================
// Catalog Validations
// ============================================================================

/// Item code: 1-30 characters, no whitespace
pub fn validate_item_code(code: &str) -> Result<(), ValidationError> {
    let code = code.trim();
    if code.is_empty() || code.len() > 30 {
        return Err(ValidationError::new(
            "codigo",
            "Item code must be 1-30 characters",
            "O código do item deve ter entre 1 e 30 caracteres",
        ));
    }
    if code.chars().any(char::is_whitespace) {
        return Err(ValidationError::new(
            "codigo",
            "Item code cannot contain spaces",
            "O código do item não pode conter espaços",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(name: &str, tag: &str) -> LocationInput {
        LocationInput {
            localizacao: name.to_string(),
            tipo_localizacao: Some(tag.to_string()),
        }
    }

    fn central(localizacoes: Vec<LocationInput>) -> WarehouseInput {
        WarehouseInput {
            codigo: "E".to_string(),
            descricao: Some("Armazém central".to_string()),
            tipo: WarehouseKind::Central,
            localizacoes,
        }
    }

    // ========================================================================
    // Warehouse Validation Tests
    // ========================================================================

    #[test]
    fn test_vehicle_locations_derived_from_code() {
        let input = WarehouseInput {
            codigo: "v848".to_string(),
            descricao: None,
            tipo: WarehouseKind::Viatura,
            localizacoes: vec![loc("QUALQUER", "expedicao")],
        };
        let normalized = normalize_warehouse(input).unwrap();
        assert_eq!(
            normalized.localizacoes,
            vec![
                Location::new("V848", LocationKind::Normal),
                Location::new("V848.FERR", LocationKind::Ferr),
            ]
        );
    }

    #[test]
    fn test_central_requires_receiving_and_shipping() {
        let ok = normalize_warehouse(central(vec![
            loc("REC", "recebimento"),
            loc("EXPEDICAO", "expedicao"),
            loc("A1", "prateleira"),
        ]))
        .unwrap();
        assert_eq!(ok.localizacoes.len(), 3);
        assert_eq!(ok.localizacoes[2].tipo_localizacao, LocationKind::Normal);

        let no_shipping = normalize_warehouse(central(vec![loc("REC", "recebimento")]));
        assert!(no_shipping.is_err());

        let no_receiving = normalize_warehouse(central(vec![loc("EXPEDICAO", "expedicao")]));
        assert!(no_receiving.is_err());
    }

    #[test]
    fn test_central_drops_empty_entries() {
        let normalized = normalize_warehouse(central(vec![
            loc("  ", "recebimento"),
            loc("REC", "recebimento"),
            loc("", "expedicao"),
            loc("EXP", "expedicao"),
        ]))
        .unwrap();
        assert_eq!(normalized.localizacoes.len(), 2);
    }

    #[test]
    fn test_empty_entry_does_not_satisfy_requirement() {
        let result = normalize_warehouse(central(vec![
            loc("REC", "recebimento"),
            loc("   ", "expedicao"),
        ]));
        assert_eq!(result.unwrap_err().field, "localizacoes");
    }

    #[test]
    fn test_duplicate_location_rejected() {
        let result = normalize_warehouse(central(vec![
            loc("REC", "recebimento"),
            loc("rec", "normal"),
            loc("EXP", "expedicao"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_code_required() {
        let mut input = central(vec![loc("REC", "recebimento"), loc("EXP", "expedicao")]);
        input.codigo = "  ".to_string();
        assert_eq!(normalize_warehouse(input).unwrap_err().field, "codigo");
    }

    // ========================================================================
    // Quantity Validation Tests
    // ========================================================================

    #[test]
    fn test_overlong_code_rejected() {
        let input = WarehouseInput {
            codigo: "V".repeat(MAX_WAREHOUSE_CODE_LEN + 10),
            descricao: None,
            tipo: WarehouseKind::Viatura,
            localizacoes: vec![],
        };
        let err = normalize_warehouse(input).unwrap_err();
        assert_eq!(err.field, "codigo");

        let longest = WarehouseInput {
            codigo: "V".repeat(MAX_WAREHOUSE_CODE_LEN),
            descricao: None,
            tipo: WarehouseKind::Viatura,
            localizacoes: vec![],
        };
        let w = normalize_warehouse(longest).unwrap();
        assert!(w
            .localizacoes
            .iter()
            .all(|l| l.localizacao.chars().count() <= MAX_LOCATION_LEN));
    }

    #[test]
    fn test_overlong_location_rejected() {
        let err = normalize_warehouse(central(vec![
            loc("E.REC", "recebimento"),
            loc("EXPEDICAO", "expedicao"),
            loc(&"A".repeat(MAX_LOCATION_LEN + 1), "normal"),
        ]))
        .unwrap_err();
        assert_eq!(err.field, "localizacoes");

        // Limit counts characters, not bytes
        let accented = "Ç".repeat(MAX_LOCATION_LEN);
        assert!(validate_max_length("localizacoes", &accented, MAX_LOCATION_LEN).is_ok());
    }

    #[test]
    fn test_prepared_quantity_bounds() {
        assert!(validate_prepared_quantity(0, 5).is_ok());
        assert!(validate_prepared_quantity(5, 5).is_ok());
        assert!(validate_prepared_quantity(6, 5).is_err());
        assert!(validate_prepared_quantity(-1, 5).is_err());
    }

    #[test]
    fn test_positive_quantity() {
        assert!(validate_positive_quantity("quantidade", 1).is_ok());
        assert!(validate_positive_quantity("quantidade", 0).is_err());
        assert!(validate_positive_quantity("quantidade", -3).is_err());
    }

    // ========================================================================
    // Composite Item Validation Tests
    // ========================================================================

    #[test]
    fn test_component_self_reference() {
        let id = Uuid::new_v4();
        assert!(validate_new_component(id, id, 1, &[]).is_err());
    }

    #[test]
    fn test_component_duplicate() {
        let item = Uuid::new_v4();
        let comp = Uuid::new_v4();
        assert!(validate_new_component(item, comp, 2, &[comp]).is_err());
        assert!(validate_new_component(item, comp, 2, &[]).is_ok());
        assert!(validate_new_component(item, comp, 0, &[]).is_err());
    }

    #[test]
    fn test_cycle_detection() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        // b -> c -> a
        let edges = vec![
            ComponentEdge { item_id: b, componente_id: c },
            ComponentEdge { item_id: c, componente_id: a },
        ];
        // a -> b would close a -> b -> c -> a
        assert!(creates_cycle(a, b, &edges));
        assert!(validate_acyclic_component(a, b, &edges).is_err());
        // b -> c exists, so c -> b closes b -> c -> b
        assert!(creates_cycle(c, b, &edges));
        // a -> d is fine
        let d = Uuid::new_v4();
        assert!(!creates_cycle(a, d, &edges));
    }

    #[test]
    fn test_item_code() {
        assert!(validate_item_code("3000001").is_ok());
        assert!(validate_item_code("").is_err());
        assert!(validate_item_code("30 01").is_err());
        assert!(validate_item_code(&"X".repeat(31)).is_err());
    }
}
