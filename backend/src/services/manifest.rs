//! Transfer manifest generation (TRFL / TRA)
//!
//! A manifest is a pure function of the requisition, its lines and the
//! resolved catalog and warehouse data. Generating one never changes the
//! requisition; the caller applies the status transition after a
//! successful render.

use std::collections::HashMap;

use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use shared::{short_id, Item, ManifestKind, Requisition, Warehouse, EXPEDICAO};

/// Manifest generation failures
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Item {0} referenced by the requisition is missing from the catalog")]
    MissingItem(Uuid),

    #[error("Warehouse {0} referenced by the requisition is missing")]
    MissingWarehouse(Uuid),

    #[error("No {what} location available for line {line_id}")]
    MissingLocation { line_id: Uuid, what: &'static str },

    #[error("Spreadsheet error: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ManifestError {
    /// Unresolved reference in the stored data, as opposed to a rendering
    /// failure
    pub fn is_data_integrity(&self) -> bool {
        matches!(
            self,
            ManifestError::MissingItem(_)
                | ManifestError::MissingWarehouse(_)
                | ManifestError::MissingLocation { .. }
        )
    }
}

/// Output file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifestFormat {
    #[default]
    Xlsx,
    Csv,
}

impl ManifestFormat {
    /// `None` and unknown values fall back to xlsx
    pub fn from_query(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("csv") => ManifestFormat::Csv,
            _ => ManifestFormat::Xlsx,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ManifestFormat::Xlsx => "xlsx",
            ManifestFormat::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ManifestFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ManifestFormat::Csv => "text/csv; charset=utf-8",
        }
    }
}

/// Everything needed to render one manifest
pub struct ManifestInput<'a> {
    pub kind: ManifestKind,
    pub requisition: &'a Requisition,
    pub items: &'a HashMap<Uuid, Item>,
    pub origin: Option<&'a Warehouse>,
    pub destination: &'a Warehouse,
}

pub const HEADERS: [&str; 10] = [
    "Requisição",
    "Código",
    "Descrição",
    "Unidade",
    "Quantidade Pedida",
    "Quantidade",
    "Armazém Origem",
    "Localização Origem",
    "Armazém Destino",
    "Localização Destino",
];

/// One manifest line, in column order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestRow {
    pub requisicao: String,
    pub codigo: String,
    pub descricao: String,
    pub unidade: String,
    pub quantidade_pedida: i32,
    pub quantidade: i32,
    pub armazem_origem: String,
    pub localizacao_origem: String,
    pub armazem_destino: String,
    pub localizacao_destino: String,
}

/// Rendered manifest
#[derive(Debug)]
pub struct ManifestFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Build the manifest rows: one per line with a positive shipped quantity.
///
/// TRFL moves stock from each line's picking location to `EXPEDICAO` inside
/// the origin warehouse. TRA moves it from `EXPEDICAO` to the destination
/// warehouse's receiving location.
pub fn build_rows(input: &ManifestInput<'_>) -> Result<Vec<ManifestRow>, ManifestError> {
    let req = input.requisition;

    if let Some(origin_id) = req.armazem_origem_id {
        match input.origin {
            Some(origin) if origin.id == origin_id => {}
            _ => return Err(ManifestError::MissingWarehouse(origin_id)),
        }
    }
    if input.destination.id != req.armazem_id {
        return Err(ManifestError::MissingWarehouse(req.armazem_id));
    }

    let origin_code = input
        .origin
        .map(|w| w.codigo.clone())
        .unwrap_or_default();
    let destination_code = input.destination.codigo.clone();
    let reference = short_id(&req.id);

    let mut rows = Vec::new();
    for line in req.itens.iter().filter(|l| l.shipped_quantity() > 0) {
        let item = input
            .items
            .get(&line.item_id)
            .ok_or(ManifestError::MissingItem(line.item_id))?;

        let (armazem_origem, localizacao_origem, armazem_destino, localizacao_destino) =
            match input.kind {
                ManifestKind::Trfl => {
                    let from = line.localizacao_origem.clone().ok_or(
                        ManifestError::MissingLocation {
                            line_id: line.id,
                            what: "picking",
                        },
                    )?;
                    let to = line
                        .localizacao_destino
                        .clone()
                        .unwrap_or_else(|| EXPEDICAO.to_string());
                    (origin_code.clone(), from, origin_code.clone(), to)
                }
                ManifestKind::Tra => {
                    let to = input
                        .destination
                        .receiving_location()
                        .map(|l| l.localizacao.clone())
                        .ok_or(ManifestError::MissingLocation {
                            line_id: line.id,
                            what: "receiving",
                        })?;
                    (
                        origin_code.clone(),
                        EXPEDICAO.to_string(),
                        destination_code.clone(),
                        to,
                    )
                }
            };

        rows.push(ManifestRow {
            requisicao: reference.clone(),
            codigo: item.codigo.clone(),
            descricao: item.descricao.clone(),
            unidade: item.unidade.clone(),
            quantidade_pedida: line.quantidade,
            quantidade: line.shipped_quantity(),
            armazem_origem,
            localizacao_origem,
            armazem_destino,
            localizacao_destino,
        });
    }

    Ok(rows)
}

/// Render a manifest in the requested format
pub fn render(
    input: &ManifestInput<'_>,
    format: ManifestFormat,
) -> Result<ManifestFile, ManifestError> {
    let rows = build_rows(input)?;
    let bytes = match format {
        ManifestFormat::Xlsx => to_xlsx(input.kind, &rows)?,
        ManifestFormat::Csv => to_csv(&rows)?,
    };

    Ok(ManifestFile {
        file_name: file_name(input.kind, &input.requisition.id, format),
        content_type: format.content_type(),
        bytes,
    })
}

pub fn file_name(kind: ManifestKind, requisition_id: &Uuid, format: ManifestFormat) -> String {
    format!(
        "{}_{}.{}",
        kind.as_str(),
        short_id(requisition_id),
        format.extension()
    )
}

fn to_xlsx(kind: ManifestKind, rows: &[ManifestRow]) -> Result<Vec<u8>, ManifestError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(kind.as_str())?;

    for (col, title) in HEADERS.iter().enumerate() {
        let col = col as u16;
        sheet.write_string_with_format(0, col, *title, &header)?;
        sheet.set_column_width(col, 18)?;
    }

    for (idx, row) in rows.iter().enumerate() {
        let r = idx as u32 + 1;
        sheet.write_string(r, 0, row.requisicao.as_str())?;
        sheet.write_string(r, 1, row.codigo.as_str())?;
        sheet.write_string(r, 2, row.descricao.as_str())?;
        sheet.write_string(r, 3, row.unidade.as_str())?;
        sheet.write_number(r, 4, row.quantidade_pedida)?;
        sheet.write_number(r, 5, row.quantidade)?;
        sheet.write_string(r, 6, row.armazem_origem.as_str())?;
        sheet.write_string(r, 7, row.localizacao_origem.as_str())?;
        sheet.write_string(r, 8, row.armazem_destino.as_str())?;
        sheet.write_string(r, 9, row.localizacao_destino.as_str())?;
    }

    Ok(workbook.save_to_buffer()?)
}

fn to_csv(rows: &[ManifestRow]) -> Result<Vec<u8>, ManifestError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(vec![]);
    wtr.write_record(HEADERS)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.into_inner()
        .map_err(|e| ManifestError::Csv(e.into_error().into()))
}
