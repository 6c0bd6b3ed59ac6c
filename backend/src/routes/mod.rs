//! Route definitions for the Almox API

use axum::{
    middleware,
    routing::{get, patch},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - requisition lifecycle
        .nest("/requisicoes", requisition_routes(state.clone()))
        // Protected routes - warehouse management
        .nest("/armazens", warehouse_routes(state.clone()))
        // Protected routes - item catalog and components
        .nest("/itens", item_routes(state))
}

/// Requisition routes (protected)
fn requisition_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_requisitions).post(handlers::create_requisition),
        )
        .route(
            "/:requisicao_id",
            get(handlers::get_requisition)
                .put(handlers::update_requisition)
                .delete(handlers::delete_requisition),
        )
        .route("/:requisicao_id/atender-item", patch(handlers::pick_item))
        .route(
            "/:requisicao_id/completar-separacao",
            patch(handlers::complete_picking),
        )
        .route(
            "/:requisicao_id/confirmar-separacao",
            patch(handlers::confirm_picking),
        )
        .route("/:requisicao_id/cancelar", patch(handlers::cancel_requisition))
        .route("/:requisicao_id/export-trfl", get(handlers::export_trfl))
        .route("/:requisicao_id/export-tra", get(handlers::export_tra))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Warehouse routes (protected)
fn warehouse_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_warehouses).post(handlers::create_warehouse),
        )
        .route(
            "/:armazem_id",
            get(handlers::get_warehouse)
                .put(handlers::update_warehouse)
                .delete(handlers::delete_warehouse),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Item catalog routes (protected)
fn item_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_items).post(handlers::create_item))
        .route(
            "/:item_id",
            get(handlers::get_item)
                .put(handlers::update_item)
                .delete(handlers::delete_item),
        )
        .route(
            "/:item_id/componentes",
            get(handlers::list_components).post(handlers::add_component),
        )
        .route(
            "/:item_id/componentes/:componente_id",
            axum::routing::put(handlers::update_component).delete(handlers::remove_component),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
