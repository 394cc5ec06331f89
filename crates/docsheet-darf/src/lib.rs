//! Offline [`StructuringService`] for DARF payment receipts
//! ("Comprovante de Arrecadação"), for batches that must not leave the
//! machine or when no canvas is available.

use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};

use docsheet_core::{ExtractedText, StructuredRecord, StructuringError, StructuringService};

pub mod parse;

pub use parse::{DarfCollection, DarfHeader, DarfItem, DarfPage, DarfTotals, parse_document};

/// Structures receipts locally by parsing their fixed layout.
///
/// Emits one record per item of the "Composição" table, each carrying the
/// page's header and collection fields. A recognised page with no parsable
/// items yields a single record with its header, collection and totals so
/// the receipt still shows up in the report. Text with no recognisable
/// receipt at all is a schema error.
#[derive(Debug, Default, Clone, Copy)]
pub struct DarfStructurer;

impl DarfStructurer {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous core of [`StructuringService::structure`].
    pub fn records(&self, document: &ExtractedText) -> Result<Vec<StructuredRecord>, StructuringError> {
        let pages = parse_document(&document.text);
        if pages.iter().all(DarfPage::is_unrecognised) {
            return Err(StructuringError::schema(
                "$",
                "no DARF receipt layout recognised in the document text",
            ));
        }

        let file_name = document.handle.name();
        let mut records = Vec::new();
        for (page_index, page) in pages.iter().enumerate() {
            if page.is_unrecognised() {
                tracing::debug!(
                    document = %document.handle.path.display(),
                    page = page_index + 1,
                    "skipping page without receipt layout"
                );
                continue;
            }
            check_totals(&file_name, page_index, page);

            let base = page_fields(&file_name, page);
            if page.items.is_empty() {
                let mut fields = base;
                if let Some(totals) = &page.totals {
                    fields.insert("Total Principal".into(), number(totals.principal));
                    fields.insert("Total Multa".into(), number(totals.multa));
                    fields.insert("Total Juros".into(), number(totals.juros));
                    fields.insert("Total Geral".into(), number(totals.total));
                }
                records.push(StructuredRecord::new(fields));
                continue;
            }

            for item in &page.items {
                let mut fields = base.clone();
                fields.insert("Código".into(), Value::from(item.codigo.clone()));
                fields.insert("Descrição".into(), Value::from(item.descricao.clone()));
                fields.insert("Principal".into(), number(item.principal));
                fields.insert("Multa".into(), number(item.multa));
                fields.insert("Juros".into(), number(item.juros));
                fields.insert("Total".into(), number(item.total));
                records.push(StructuredRecord::new(fields));
            }
        }
        Ok(records)
    }
}

fn number(value: Option<f64>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

fn page_fields(file_name: &str, page: &DarfPage) -> Map<String, Value> {
    let header = page.header.clone().unwrap_or_default();
    let collection = page.collection.clone().unwrap_or_default();

    let mut fields = Map::new();
    fields.insert("Arquivo".into(), Value::from(file_name));
    fields.insert("CNPJ".into(), Value::from(header.cnpj));
    fields.insert("Razão Social".into(), Value::from(header.razao_social));
    fields.insert("Período Apuração".into(), Value::from(header.periodo_apuracao));
    fields.insert("Vencimento".into(), Value::from(header.data_vencimento));
    fields.insert("Número do Documento".into(), Value::from(header.numero_documento));
    fields.insert("Banco".into(), Value::from(collection.banco));
    fields.insert("Data de Arrecadação".into(), Value::from(collection.data_arrecadacao));
    fields.insert("Agência".into(), Value::from(collection.agencia));
    fields.insert("Estabelecimento".into(), Value::from(collection.estabelecimento));
    fields.insert(
        "Valor Reservado/Restituído".into(),
        number(collection.valor_reservado),
    );
    fields.insert("Referência".into(), Value::from(collection.referencia));
    fields
}

/// Warn when the item totals do not add up to the printed "Totais" line.
fn check_totals(file_name: &str, page_index: usize, page: &DarfPage) {
    let Some(expected) = page.totals.as_ref().and_then(|t| t.total) else {
        return;
    };
    if page.items.is_empty() {
        return;
    }
    let sum: f64 = page.items.iter().filter_map(|i| i.total).sum();
    if (sum - expected).abs() > 0.005 {
        tracing::warn!(
            document = file_name,
            page = page_index + 1,
            items_total = sum,
            printed_total = expected,
            "receipt items do not add up to the printed total"
        );
    }
}

impl StructuringService for DarfStructurer {
    fn name(&self) -> &str {
        "DARF (offline)"
    }

    fn structure<'a>(
        &'a self,
        document: &'a ExtractedText,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StructuredRecord>, StructuringError>> + Send + 'a>>
    {
        Box::pin(async move { self.records(document) })
    }
}
