//! Layout parser for the "Comprovante de Arrecadação" receipt.
//!
//! Every page of a receipt PDF is an independent receipt. A page has a
//! header, an item table ("Composição do Documento de Arrecadação") closed by
//! a "Totais" line, and a block describing where the payment was made.

use once_cell::sync::Lazy;
use regex::Regex;

/// Monetary value in Brazilian notation, e.g. `1.649,18`.
const BR_AMOUNT: &str = r"(?:\d{1,3}\.)*\d+,\d{2}";

/// Header fields of one receipt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DarfHeader {
    pub cnpj: String,
    pub razao_social: String,
    pub periodo_apuracao: String,
    pub data_vencimento: String,
    pub numero_documento: String,
}

/// One line of the item table.
#[derive(Debug, Clone, PartialEq)]
pub struct DarfItem {
    pub codigo: String,
    pub descricao: String,
    pub principal: Option<f64>,
    pub multa: Option<f64>,
    pub juros: Option<f64>,
    pub total: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DarfTotals {
    pub principal: Option<f64>,
    pub multa: Option<f64>,
    pub juros: Option<f64>,
    pub total: Option<f64>,
}

/// Where and when the payment was collected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DarfCollection {
    pub banco: String,
    pub data_arrecadacao: String,
    pub agencia: String,
    pub estabelecimento: String,
    pub valor_reservado: Option<f64>,
    pub referencia: String,
}

/// Everything read from one page. Sections that did not match are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DarfPage {
    pub header: Option<DarfHeader>,
    pub items: Vec<DarfItem>,
    pub totals: Option<DarfTotals>,
    pub collection: Option<DarfCollection>,
}

impl DarfPage {
    /// True when nothing on the page looked like a receipt.
    pub fn is_unrecognised(&self) -> bool {
        self.header.is_none() && self.items.is_empty() && self.totals.is_none()
    }
}

/// Parse a Brazilian-formatted number (`1.649,18` -> `1649.18`).
pub fn br_to_number(s: &str) -> Option<f64> {
    let clean: String = s
        .replace('.', "")
        .replacen(',', ".", 1)
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    clean.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Replace non-breaking spaces, collapse runs of blanks and trim.
pub fn normalize_spaces(s: &str) -> String {
    static BLANKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
    BLANKS
        .replace_all(&s.replace('\u{a0}', " "), " ")
        .trim()
        .to_string()
}

/// Merge description continuation lines into the item they belong to.
/// An item line starts with its four-digit revenue code.
pub fn join_wrapped_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    static ITEM_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}\b").unwrap());

    let mut out: Vec<String> = Vec::new();
    for raw in lines {
        let line = normalize_spaces(raw);
        if line.is_empty() {
            continue;
        }
        match out.last_mut() {
            Some(last) if !ITEM_START.is_match(&line) => {
                *last = normalize_spaces(&format!("{} {}", last, line));
            }
            _ => out.push(line),
        }
    }
    out
}

/// Split extracted text into pages on form feed and parse each one.
pub fn parse_document(text: &str) -> Vec<DarfPage> {
    text.split('\u{c}')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(parse_page)
        .collect()
}

pub fn parse_page(page_text: &str) -> DarfPage {
    static TRAILING_BLANKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+\n").unwrap());
    let text = page_text.replace('\r', "");
    let text = TRAILING_BLANKS.replace_all(&text, "\n");
    let text = text.trim();

    DarfPage {
        header: parse_header(text),
        items: parse_items(text),
        totals: parse_totals(text),
        collection: parse_collection(text),
    }
}

fn parse_header(text: &str) -> Option<DarfHeader> {
    static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?i)CNPJ\s*([0-9./-]+)\s+([^\n]+?)\s+Período Apuração\s*([0-9/]+)\s+Data de Vencimento\s*([0-9/]+)\s+Número do Documento\s*([0-9]+)",
        )
        .unwrap()
    });

    let caps = HEADER_RE.captures(text)?;
    let field = |i: usize| {
        caps.get(i)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default()
    };
    Some(DarfHeader {
        cnpj: field(1),
        razao_social: field(2),
        periodo_apuracao: field(3),
        data_vencimento: field(4),
        numero_documento: field(5),
    })
}

/// Text from the item table heading up to (not including) "Totais".
fn item_block(text: &str) -> Option<&str> {
    static START_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)Composição do Documento de Arrecadação").unwrap());
    static END_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Totais").unwrap());

    let start = START_RE.find(text)?;
    let rest = &text[start.end()..];
    let end = END_RE.find(rest).map(|m| m.start()).unwrap_or(rest.len());
    Some(&rest[..end])
}

fn parse_items(text: &str) -> Vec<DarfItem> {
    static COLUMN_TITLES: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\b(?:Código|Descrição|Principal|Multa|Juros|Total)\b").unwrap()
    });
    static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());
    static ITEM_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(&format!(
            r"^(\d{{4}})\s+(.+?)\s+({a})(?:\s+({a}))?(?:\s+({a}))?\s+({a})$",
            a = BR_AMOUNT
        ))
        .unwrap()
    });

    let Some(block) = item_block(text) else {
        return vec![];
    };
    let block = COLUMN_TITLES.replace_all(block, " ");
    let block = BLANK_LINES.replace_all(&block, "\n");

    join_wrapped_lines(block.lines())
        .iter()
        .filter_map(|line| {
            let caps = ITEM_RE.captures(line)?;
            let amount = |i: usize| caps.get(i).map(|m| m.as_str());
            let (first, second, third, last) = (amount(3)?, amount(4), amount(5), amount(6)?);

            // Rows omit zero columns: two amounts are principal and total,
            // three are principal, interest and total.
            let (multa, juros) = match (second, third) {
                (Some(m), Some(j)) => (m, j),
                (Some(j), None) | (None, Some(j)) => ("0,00", j),
                (None, None) => ("0,00", "0,00"),
            };

            Some(DarfItem {
                codigo: caps[1].trim().to_string(),
                descricao: normalize_spaces(&caps[2]),
                principal: br_to_number(first),
                multa: br_to_number(multa),
                juros: br_to_number(juros),
                total: br_to_number(last),
            })
        })
        .collect()
}

fn parse_totals(text: &str) -> Option<DarfTotals> {
    static TOTALS_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(&format!(
            r"(?i)Totais\s+({a})\s+({a})\s+({a})\s+({a})",
            a = BR_AMOUNT
        ))
        .unwrap()
    });

    let caps = TOTALS_RE.captures(text)?;
    Some(DarfTotals {
        principal: br_to_number(&caps[1]),
        multa: br_to_number(&caps[2]),
        juros: br_to_number(&caps[3]),
        total: br_to_number(&caps[4]),
    })
}

fn parse_collection(text: &str) -> Option<DarfCollection> {
    static BANK_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?i)Banco\s+(.+?)\s+Data de Arrecadação\s+([0-9/]+)\s+Agência\s+(\d+)\s+Estabelecimento\s+(\d+)\s+Valor Reservado/Restituído\s+([0-9.,-]+)(?:\s+Referência\s+([^\n]+))?",
        )
        .unwrap()
    });

    let caps = BANK_RE.captures(text)?;
    let field = |i: usize| {
        caps.get(i)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default()
    };
    Some(DarfCollection {
        banco: normalize_spaces(&field(1)),
        data_arrecadacao: field(2),
        agencia: field(3),
        estabelecimento: field(4),
        valor_reservado: br_to_number(&field(5)),
        referencia: field(6),
    })
}
