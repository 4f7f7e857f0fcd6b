//! Semantic field resolver.
//!
//! Source files name the same concept many ways ("Responsável", "RESPONSAVEL",
//! "responsavel "). Every consumer resolves roles through this module instead
//! of keeping its own candidate lists.

use serde::Serialize;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::model::{CellValue, DataRow};

/// An abstract field meaning, independent of the column name carrying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticRole {
    Identifier,
    Status,
    OpenedDate,
    DueDate,
    ResponsibleParty,
    Client,
    GrossAmount,
    NetAmount,
    PaymentMethod,
    Pcc,
    Ir,
    IssBase,
    Period,
    Description,
}

impl SemanticRole {
    pub const ALL: [SemanticRole; 14] = [
        SemanticRole::Identifier,
        SemanticRole::Status,
        SemanticRole::OpenedDate,
        SemanticRole::DueDate,
        SemanticRole::ResponsibleParty,
        SemanticRole::Client,
        SemanticRole::GrossAmount,
        SemanticRole::NetAmount,
        SemanticRole::PaymentMethod,
        SemanticRole::Pcc,
        SemanticRole::Ir,
        SemanticRole::IssBase,
        SemanticRole::Period,
        SemanticRole::Description,
    ];

    /// Column names tried for this role, highest priority first.
    pub fn candidates(self) -> &'static [&'static str] {
        match self {
            SemanticRole::Identifier => {
                &["Caso", "Chamado", "caso", "chamado", "CASO", "CHAMADO"]
            }
            SemanticRole::Status => {
                &["Status", "status", "STATUS", "Situação", "Situacao", "situação"]
            }
            SemanticRole::OpenedDate => &[
                "Data de Abertura",
                "Data Abertura",
                "data de abertura",
                "Abertura",
                "Data",
                "data",
            ],
            SemanticRole::DueDate => &[
                "Data de Vencimento",
                "Data Vencimento",
                "Vencimento",
                "vencimento",
            ],
            SemanticRole::ResponsibleParty => &[
                "Responsável",
                "Responsavel",
                "responsável",
                "responsavel",
                "Analista",
            ],
            SemanticRole::Client => &[
                "Cliente",
                "cliente",
                "Empresa",
                "empresa",
                "Razão Social",
                "Fornecedor",
            ],
            SemanticRole::GrossAmount => &[
                "Valor Total",
                "Total",
                "Valor Bruto",
                "valor total",
                "Valor",
                "valor",
            ],
            SemanticRole::NetAmount => {
                &["Valor Líquido", "Valor Liquido", "valor líquido", "Líquido"]
            }
            SemanticRole::PaymentMethod => &[
                "Forma de Pagamento",
                "Forma Pagamento",
                "forma de pagamento",
                "Pagamento",
            ],
            SemanticRole::Pcc => &["PCC", "pcc", "Retenção PCC"],
            SemanticRole::Ir => &["IR", "ir", "IRRF", "Retenção IR"],
            SemanticRole::IssBase => &["Base ISS", "Base de Cálculo ISS", "base iss", "ISS Base"],
            SemanticRole::Period => &[
                "Período",
                "Periodo",
                "período",
                "Competência",
                "Exercício",
                "Exercicio",
            ],
            SemanticRole::Description => &[
                "Inconsistencias",
                "Inconsistências",
                "inconsistencias",
                "Descrição",
                "Descricao",
                "descrição",
                "Observações",
                "Observacoes",
                "observações",
            ],
        }
    }

    /// Roles whose values are money and get BRL formatting.
    pub fn is_monetary(self) -> bool {
        matches!(
            self,
            SemanticRole::GrossAmount
                | SemanticRole::NetAmount
                | SemanticRole::Pcc
                | SemanticRole::Ir
                | SemanticRole::IssBase
        )
    }
}

/// Trimmed, lowercased and stripped of accents.
pub fn fold(name: &str) -> String {
    name.trim()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// The column that answered a role on one row, and its value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedField {
    pub column: String,
    pub value: CellValue,
}

/// Column name answering `role` in `row`, if any.
///
/// Exact matches over all candidates are tried before the folded pass, and
/// within a pass the earlier candidate wins.
pub fn resolve_column<'a>(row: &'a DataRow, role: SemanticRole) -> Option<&'a str> {
    let candidates = role.candidates();

    if let Some(key) = candidates
        .iter()
        .find_map(|candidate| row.get_key_value(*candidate).map(|(key, _)| key))
    {
        return Some(key.as_str());
    }

    candidates.iter().find_map(|candidate| {
        let wanted = fold(candidate);
        row.keys()
            .find(|key| fold(key) == wanted)
            .map(String::as_str)
    })
}

pub fn resolve(row: &DataRow, role: SemanticRole) -> Option<ResolvedField> {
    let column = resolve_column(row, role)?;
    Some(ResolvedField {
        column: column.to_string(),
        value: row.get(column).cloned().unwrap_or(CellValue::Null),
    })
}

/// Value of `role` when it resolves to a non-blank cell.
pub fn resolve_value(row: &DataRow, role: SemanticRole) -> Option<&CellValue> {
    let column = resolve_column(row, role)?;
    row.get(column).filter(|value| !value.is_blank())
}

/// Columns whose values are dates: names containing "data", or "vencimento".
pub fn is_date_column(name: &str) -> bool {
    let lower = name.trim().to_lowercase();
    lower.contains("data") || lower == "vencimento"
}

const CURRENCY_KEYWORDS: &[&str] = &["valor", "preco", "custo", "montante"];

/// Columns whose values are money by name alone. A standalone "id" word
/// ("Id do Valor") marks a code column and is excluded.
pub fn is_currency_column(name: &str) -> bool {
    let folded = fold(name);
    let has_keyword = CURRENCY_KEYWORDS.iter().any(|keyword| folded.contains(keyword));
    let is_identifier = folded
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word == "id");
    has_keyword && !is_identifier
}

/// Every role of one row, resolved fresh. Used by case-detail views.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SemanticFieldMap {
    pub identifier: Option<ResolvedField>,
    pub status: Option<ResolvedField>,
    pub opened_date: Option<ResolvedField>,
    pub due_date: Option<ResolvedField>,
    pub responsible_party: Option<ResolvedField>,
    pub client: Option<ResolvedField>,
    pub gross_amount: Option<ResolvedField>,
    pub net_amount: Option<ResolvedField>,
    pub payment_method: Option<ResolvedField>,
    pub pcc: Option<ResolvedField>,
    pub ir: Option<ResolvedField>,
    pub iss_base: Option<ResolvedField>,
    pub period: Option<ResolvedField>,
    pub description: Option<ResolvedField>,
    /// A non-blank description marks the case as an identified inconsistency.
    pub has_inconsistency: bool,
}

impl SemanticFieldMap {
    pub fn from_row(row: &DataRow) -> Self {
        let description = resolve(row, SemanticRole::Description);
        let has_inconsistency = description
            .as_ref()
            .is_some_and(|field| !field.value.is_blank());

        Self {
            identifier: resolve(row, SemanticRole::Identifier),
            status: resolve(row, SemanticRole::Status),
            opened_date: resolve(row, SemanticRole::OpenedDate),
            due_date: resolve(row, SemanticRole::DueDate),
            responsible_party: resolve(row, SemanticRole::ResponsibleParty),
            client: resolve(row, SemanticRole::Client),
            gross_amount: resolve(row, SemanticRole::GrossAmount),
            net_amount: resolve(row, SemanticRole::NetAmount),
            payment_method: resolve(row, SemanticRole::PaymentMethod),
            pcc: resolve(row, SemanticRole::Pcc),
            ir: resolve(row, SemanticRole::Ir),
            iss_base: resolve(row, SemanticRole::IssBase),
            period: resolve(row, SemanticRole::Period),
            description,
            has_inconsistency,
        }
    }

    /// True when any amount-type role resolved to a value.
    pub fn has_financials(&self) -> bool {
        [&self.gross_amount, &self.net_amount]
            .iter()
            .any(|field| field.as_ref().is_some_and(|f| !f.value.is_blank()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> DataRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), CellValue::from(*v)))
            .collect()
    }

    // -------------------------------------------------------------------------
    // MATCHING
    // -------------------------------------------------------------------------

    #[test]
    fn test_exact_match() {
        let r = row(&[("Status", "Pendente")]);
        let field = resolve(&r, SemanticRole::Status).unwrap();
        assert_eq!(field.column, "Status");
        assert_eq!(field.value, CellValue::from("Pendente"));
    }

    #[test]
    fn test_case_and_accent_insensitive() {
        let upper = row(&[("RESPONSAVEL", "Ana")]);
        let accented = row(&[("Responsável", "Ana")]);

        let a = resolve(&upper, SemanticRole::ResponsibleParty).unwrap();
        let b = resolve(&accented, SemanticRole::ResponsibleParty).unwrap();
        assert_eq!(a.value, b.value);
        assert_eq!(a.column, "RESPONSAVEL");
    }

    #[test]
    fn test_whitespace_trimmed_match() {
        let r = row(&[("  forma de pagamento ", "PIX")]);
        let field = resolve(&r, SemanticRole::PaymentMethod).unwrap();
        assert_eq!(field.value, CellValue::from("PIX"));
    }

    #[test]
    fn test_exact_pass_precedes_folded_pass() {
        // "Total" matches exactly; "VALOR TOTAL" only matches after folding
        let r = row(&[("VALOR TOTAL", "1,00"), ("Total", "2,00")]);
        let field = resolve(&r, SemanticRole::GrossAmount).unwrap();
        assert_eq!(field.column, "Total");
    }

    #[test]
    fn test_gross_amount_synonym_order() {
        let r = row(&[("Valor Bruto", "1,00"), ("Total", "2,00")]);
        assert_eq!(resolve(&r, SemanticRole::GrossAmount).unwrap().column, "Total");

        let r = row(&[("Valor Bruto", "1,00"), ("Valor Total", "3,00")]);
        assert_eq!(resolve(&r, SemanticRole::GrossAmount).unwrap().column, "Valor Total");
    }

    #[test]
    fn test_unresolved_role_is_none() {
        let r = row(&[("Id do Pedido", "9")]);
        assert!(resolve(&r, SemanticRole::ResponsibleParty).is_none());
        assert!(resolve_value(&r, SemanticRole::Status).is_none());
    }

    #[test]
    fn test_blank_value_not_returned_by_resolve_value() {
        let mut r = row(&[("Status", "")]);
        r.insert("Status".to_string(), CellValue::Null);
        assert!(resolve(&r, SemanticRole::Status).is_some());
        assert!(resolve_value(&r, SemanticRole::Status).is_none());
    }

    #[test]
    fn test_fold() {
        assert_eq!(fold("  Observações "), "observacoes");
        assert_eq!(fold("PERÍODO"), "periodo");
    }

    // -------------------------------------------------------------------------
    // COLUMN CLASSIFICATION
    // -------------------------------------------------------------------------

    #[test]
    fn test_date_columns() {
        assert!(is_date_column("Data de Abertura"));
        assert!(is_date_column("DATA"));
        assert!(is_date_column("Vencimento"));
        assert!(!is_date_column("Vencimento Original"));
        assert!(!is_date_column("Status"));
    }

    #[test]
    fn test_currency_columns() {
        assert!(is_currency_column("Valor"));
        assert!(is_currency_column("Preço Unitário"));
        assert!(is_currency_column("Valor Líquido"));
        assert!(is_currency_column("Custo"));
        assert!(!is_currency_column("Id do Valor"));
        assert!(!is_currency_column("Status"));
    }

    // -------------------------------------------------------------------------
    // FIELD MAP
    // -------------------------------------------------------------------------

    #[test]
    fn test_field_map_flags_inconsistency() {
        let r = row(&[
            ("Chamado", "10"),
            ("Status", "Pendente"),
            ("Inconsistências", "CNPJ divergente"),
            ("Valor Total", "1.000,00"),
        ]);

        let map = SemanticFieldMap::from_row(&r);
        assert!(map.has_inconsistency);
        assert!(map.has_financials());
        assert_eq!(map.identifier.unwrap().value, CellValue::from("10"));
        assert!(map.net_amount.is_none());
    }

    #[test]
    fn test_field_map_blank_description_no_flag() {
        let r = row(&[("Descrição", "   ")]);
        let map = SemanticFieldMap::from_row(&r);
        assert!(map.description.is_some());
        assert!(!map.has_inconsistency);
        assert!(!map.has_financials());
    }
}
