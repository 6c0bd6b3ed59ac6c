//! WebAssembly module for the Almox browser client
//!
//! Provides client-side pre-validation for:
//! - Warehouse location forms (central and vehicle shapes)
//! - Pick quantities
//! - Requisition status transitions
//!
//! The server re-runs every check; these only spare a round trip.

use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::validation::*;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    web_sys::console::debug_1(&JsValue::from_str("almox-wasm loaded"));
}

/// Normalize a warehouse payload.
///
/// Returns the normalized warehouse as JSON, or throws the validation error
/// (`{field, message, message_pt}`) as JSON.
#[wasm_bindgen]
pub fn normalize_warehouse_json(input_json: &str) -> Result<String, JsValue> {
    normalize_warehouse_str(input_json).map_err(|e| JsValue::from_str(&e))
}

/// Locations a vehicle warehouse gets for the given code, as JSON
#[wasm_bindgen]
pub fn vehicle_locations_json(codigo: &str) -> String {
    serde_json::to_string(&vehicle_locations(codigo)).unwrap_or_default()
}

/// Check `0 <= prepared <= requested`; throws the validation error as JSON
#[wasm_bindgen]
pub fn validate_pick_quantity(prepared: i32, requested: i32) -> Result<(), JsValue> {
    validate_prepared_quantity(prepared, requested)
        .map_err(|e| JsValue::from_str(&error_json(&e)))
}

/// Whether `from -> to` is a single lifecycle step. Unknown statuses are false.
#[wasm_bindgen]
pub fn can_transition(from: &str, to: &str) -> bool {
    match (RequisitionStatus::parse(from), RequisitionStatus::parse(to)) {
        (Some(from), Some(to)) => from.can_transition_to(to),
        _ => false,
    }
}

/// Statuses reachable in one step from `status`
#[wasm_bindgen]
pub fn next_statuses(status: &str) -> js_sys::Array {
    next_status_names(status)
        .into_iter()
        .map(JsValue::from_str)
        .collect()
}

/// Whether a manifest download would advance the status.
///
/// `"advance"`, `"reissue"` or `"blocked"`.
#[wasm_bindgen]
pub fn manifest_action(status: &str, separacao_confirmada: bool, kind: &str) -> String {
    manifest_action_name(status, separacao_confirmada, kind).to_string()
}

fn normalize_warehouse_str(input_json: &str) -> Result<String, String> {
    let input: WarehouseInput = serde_json::from_str(input_json)
        .map_err(|e| format!("Invalid warehouse JSON: {}", e))?;
    let normalized = normalize_warehouse(input).map_err(|e| error_json(&e))?;
    serde_json::to_string(&normalized).map_err(|e| e.to_string())
}

fn error_json(error: &ValidationError) -> String {
    serde_json::to_string(error).unwrap_or_else(|_| error.message.clone())
}

fn next_status_names(status: &str) -> Vec<&'static str> {
    let Some(from) = RequisitionStatus::parse(status) else {
        return Vec::new();
    };
    RequisitionStatus::ALL
        .into_iter()
        .filter(|to| from.can_transition_to(*to))
        .map(|to| to.as_str())
        .collect()
}

fn manifest_action_name(status: &str, separacao_confirmada: bool, kind: &str) -> &'static str {
    use RequisitionStatus::*;

    let status = RequisitionStatus::parse(status);
    match (kind, status) {
        ("TRFL", Some(Separado)) if separacao_confirmada => "advance",
        ("TRFL", Some(EmExpedicao | Entregue)) => "reissue",
        ("TRA", Some(EmExpedicao)) => "advance",
        ("TRA", Some(Entregue)) => "reissue",
        _ => "blocked",
    }
}
