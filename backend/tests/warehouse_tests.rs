//! Warehouse validation tests
//!
//! Tests for warehouse normalization including:
//! - Property 5: Vehicle Warehouse Shape
//! - Property 6: Central Warehouse Requirement

use proptest::prelude::*;
use shared::{
    normalize_warehouse, Location, LocationInput, LocationKind, WarehouseInput, WarehouseKind,
};

fn loc(name: &str, tag: Option<&str>) -> LocationInput {
    LocationInput {
        localizacao: name.to_string(),
        tipo_localizacao: tag.map(str::to_string),
    }
}

fn input(codigo: &str, tipo: WarehouseKind, localizacoes: Vec<LocationInput>) -> WarehouseInput {
    WarehouseInput {
        codigo: codigo.to_string(),
        descricao: None,
        tipo,
        localizacoes,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Vehicle V848 always gets its base and tool locations
    #[test]
    fn test_vehicle_v848() {
        let w = normalize_warehouse(input(
            "V848",
            WarehouseKind::Viatura,
            vec![loc("EXPEDICAO", Some("expedicao")), loc("X", None)],
        ))
        .unwrap();

        assert_eq!(
            w.localizacoes,
            vec![
                Location::new("V848", LocationKind::Normal),
                Location::new("V848.FERR", LocationKind::Ferr),
            ]
        );
    }

    #[test]
    fn test_central_without_expedicao_fails() {
        let err = normalize_warehouse(input(
            "E",
            WarehouseKind::Central,
            vec![loc("E.REC", Some("recebimento")), loc("A1", Some("normal"))],
        ))
        .unwrap_err();
        assert_eq!(err.field, "localizacoes");
        assert!(err.message.contains("expedicao"));
    }

    #[test]
    fn test_central_accepts_accented_tag() {
        let w = normalize_warehouse(input(
            "E",
            WarehouseKind::Central,
            vec![
                loc(" E.REC ", Some("recebimento")),
                loc("EXPEDICAO", Some("expedição")),
                loc("", Some("recebimento")),
                loc("A1", Some("prateleira")),
            ],
        ))
        .unwrap();

        assert_eq!(w.localizacoes.len(), 3);
        assert_eq!(w.localizacoes[0].localizacao, "E.REC");
        assert_eq!(w.localizacoes[1].tipo_localizacao, LocationKind::Expedicao);
        assert_eq!(w.localizacoes[2].tipo_localizacao, LocationKind::Normal);
    }

    #[test]
    fn test_payload_from_json() {
        let payload: WarehouseInput = serde_json::from_str(
            r#"{
                "codigo": "E",
                "descricao": "",
                "tipo": "central",
                "localizacoes": [
                    {"localizacao": "E.REC", "tipo_localizacao": "recebimento"},
                    {"localizacao": "EXPEDICAO", "tipo_localizacao": "expedicao"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(payload.descricao, None);

        let w = normalize_warehouse(payload).unwrap();
        assert_eq!(w.tipo, WarehouseKind::Central);
        assert_eq!(w.localizacoes.len(), 2);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn code_strategy() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z0-9]{0,7}"
    }

    fn tag_strategy() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            Just(Some("normal".to_string())),
            Just(Some("recebimento".to_string())),
            Just(Some("expedicao".to_string())),
            Just(Some("FERR".to_string())),
            "[a-z]{1,10}".prop_map(Some),
        ]
    }

    fn locations_strategy() -> impl Strategy<Value = Vec<LocationInput>> {
        prop::collection::vec(
            ("[A-Z0-9.]{0,6}", tag_strategy()).prop_map(|(localizacao, tipo_localizacao)| {
                LocationInput {
                    localizacao,
                    tipo_localizacao,
                }
            }),
            0..8,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Property 5: Vehicle Warehouse Shape
        /// Submitted locations never influence a vehicle's locations
        #[test]
        fn prop_vehicle_locations_ignore_payload(
            codigo in code_strategy(),
            submitted in locations_strategy()
        ) {
            let w = normalize_warehouse(input(&codigo, WarehouseKind::Viatura, submitted)).unwrap();
            let base = codigo.to_uppercase();

            prop_assert_eq!(
                w.localizacoes,
                vec![
                    Location::new(base.clone(), LocationKind::Normal),
                    Location::new(format!("{}.FERR", base), LocationKind::Ferr),
                ]
            );
        }

        /// Property 6: Central Warehouse Requirement
        /// Accepted iff the non-empty entries carry both required tags
        #[test]
        fn prop_central_requires_receiving_and_shipping(
            submitted in locations_strategy()
        ) {
            let non_empty: Vec<&LocationInput> = submitted
                .iter()
                .filter(|l| !l.localizacao.trim().is_empty())
                .collect();
            let has = |kind: LocationKind| {
                non_empty.iter().any(|l| {
                    LocationKind::from_submitted_tag(l.tipo_localizacao.as_deref()) == kind
                })
            };
            let mut names: Vec<String> = non_empty
                .iter()
                .map(|l| l.localizacao.trim().to_uppercase())
                .collect();
            names.sort();
            let total = names.len();
            names.dedup();
            let unique = names.len() == total;

            let result = normalize_warehouse(input("E", WarehouseKind::Central, submitted.clone()));

            if !has(LocationKind::Expedicao) || !has(LocationKind::Recebimento) || !unique {
                prop_assert!(result.is_err());
            } else {
                let w = result.unwrap();
                prop_assert_eq!(w.localizacoes.len(), non_empty.len());
                prop_assert!(w
                    .localizacoes
                    .iter()
                    .all(|l| l.tipo_localizacao != LocationKind::Ferr));
            }
        }
    }
}
