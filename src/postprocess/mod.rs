//! Canonicalization and field-specific structuring of extracted text.
//!
//! Every backend response runs through the same pipeline: width and kana
//! canonicalization first, then the transform for the requested field type.
//! The pipeline is pure and idempotent; running it twice is a no-op.

mod kana;
mod phone;

use std::sync::OnceLock;

use regex::Regex;

pub use kana::{halfwidth_katakana_to_fullwidth, katakana_to_hiragana, normalize_width};
pub use phone::{format_candidates, format_phone_number};

use crate::models::FieldType;

/// Corporate entity-type tokens stripped from payee names.
///
/// Longest tokens first so the alternation matches 医療法人社団 before 医療法人.
const ENTITY_TOKENS: [&str; 40] = [
    "特定非営利活動法人",
    "社会保険労務士法人",
    "地方独立行政法人",
    "独立行政法人",
    "国立大学法人",
    "一般社団法人",
    "公益社団法人",
    "一般財団法人",
    "公益財団法人",
    "医療法人社団",
    "医療法人財団",
    "特例有限会社",
    "農業協同組合",
    "生活協同組合",
    "社会福祉法人",
    "司法書士法人",
    "行政書士法人",
    "医療法人",
    "学校法人",
    "宗教法人",
    "弁護士法人",
    "税理士法人",
    "監査法人",
    "NPO法人",
    "協同組合",
    "株式会社",
    "有限会社",
    "合同会社",
    "合資会社",
    "合名会社",
    "相互会社",
    "信用金庫",
    "信用組合",
    "(株)",
    "(有)",
    "㈱",
    "㈲",
    "営業所",
    "支店",
    "本店",
];

fn entity_token_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let alternation = ENTITY_TOKENS
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&alternation).expect("entity token regex")
    })
}

/// Run the full post-processing pipeline for one field.
pub fn post_process(text: &str, field_type: Option<FieldType>) -> String {
    let mut s = normalize_width(text.trim());
    s = halfwidth_katakana_to_fullwidth(&s);

    match field_type {
        Some(FieldType::PhoneNumber) => format_candidates(&s),
        Some(FieldType::PayeeName) => {
            let stripped = strip_entity_tokens(&s);
            collapse_whitespace(&stripped)
        }
        Some(FieldType::Phonetic) => katakana_to_hiragana(s.trim()),
        Some(FieldType::Clipboard) | Some(FieldType::Freeform) | None => s.trim().to_string(),
    }
}

/// Strip entity-type tokens from a payee name and tidy the remnants.
///
/// After stripping, comma-separated remnants are rejoined with empty items
/// and label fragments dropped.
pub fn strip_entity_tokens(text: &str) -> String {
    let stripped = entity_token_pattern().replace_all(text, "");

    stripped
        .split(',')
        .map(|part| {
            part.trim()
                .trim_start_matches("会社名:")
                .trim_end_matches(':')
                .trim()
        })
        .filter(|part| !part.is_empty() && *part != "会社名")
        .collect::<Vec<_>>()
        .join(",")
}

/// Collapse internal whitespace runs to a single space.
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pull the labeled sub-fields out of one payee-name response.
///
/// Scans for `会社名:` and `電話番号:` line prefixes. A missing label yields
/// an empty string for that sub-field, never an error; if neither label is
/// present the whole text counts as the company name.
pub fn split_labeled_fields(text: &str) -> (String, String) {
    let normalized = normalize_width(text);
    let mut company = String::new();
    let mut phone = String::new();
    let mut saw_label = false;

    for line in normalized.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("会社名:") {
            company = rest.trim().to_string();
            saw_label = true;
        } else if let Some(rest) = line.strip_prefix("電話番号:") {
            phone = rest.trim().to_string();
            saw_label = true;
        }
    }

    if !saw_label {
        company = normalized.trim().to_string();
    }

    (company, phone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payee_name_strips_entity_tokens_and_rejoins() {
        assert_eq!(
            post_process("株式会社テスト, 支店", Some(FieldType::PayeeName)),
            "テスト"
        );
    }

    #[test]
    fn payee_name_strips_multiple_token_kinds() {
        assert_eq!(strip_entity_tokens("医療法人社団あおば会"), "あおば会");
        assert_eq!(strip_entity_tokens("(株)山田製作所"), "山田製作所");
        assert_eq!(strip_entity_tokens("㈱鈴木商店"), "鈴木商店");
        assert_eq!(
            strip_entity_tokens("会社名: テスト商事, 株式会社"),
            "テスト商事"
        );
    }

    #[test]
    fn payee_name_collapses_whitespace() {
        assert_eq!(
            post_process("テスト　 商事", Some(FieldType::PayeeName)),
            "テスト 商事"
        );
    }

    #[test]
    fn phone_field_formats_candidates() {
        assert_eq!(
            post_process("０３１２３４５６７８、09011112222", Some(FieldType::PhoneNumber)),
            "03-1234-5678,090-1111-2222"
        );
    }

    #[test]
    fn phonetic_field_converts_to_hiragana() {
        assert_eq!(post_process("ﾃｽﾄ", Some(FieldType::Phonetic)), "てすと");
        assert_eq!(post_process("カブシキ", Some(FieldType::Phonetic)), "かぶしき");
    }

    #[test]
    fn freeform_only_canonicalizes() {
        assert_eq!(
            post_process("  Ｈｅｌｌｏ ﾜｰﾙﾄﾞ  ", Some(FieldType::Freeform)),
            "Hello ワールド"
        );
    }

    #[test]
    fn pipeline_is_idempotent_per_field() {
        let samples = [
            ("株式会社テスト, 支店", Some(FieldType::PayeeName)),
            ("０３１２３４５６７８", Some(FieldType::PhoneNumber)),
            ("ﾊﾟｰﾙｶﾞｰﾃﾞﾝ", Some(FieldType::Phonetic)),
            ("ＡＢＣ ｶﾀｶﾅ mixed", Some(FieldType::Freeform)),
            ("ｶﾞｷﾞｸﾞｹﾞｺﾞ", None),
        ];
        for (input, field) in samples {
            let once = post_process(input, field);
            let twice = post_process(&once, field);
            assert_eq!(once, twice, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn labeled_fields_split() {
        let (company, phone) =
            split_labeled_fields("会社名: 株式会社テスト\n電話番号: 03-1234-5678");
        assert_eq!(company, "株式会社テスト");
        assert_eq!(phone, "03-1234-5678");
    }

    #[test]
    fn missing_labels_fall_back_to_whole_text() {
        let (company, phone) = split_labeled_fields("テスト商事");
        assert_eq!(company, "テスト商事");
        assert_eq!(phone, "");

        let (company, phone) = split_labeled_fields("電話番号: 0312345678");
        assert_eq!(company, "");
        assert_eq!(phone, "0312345678");
    }

    #[test]
    fn fullwidth_labels_are_recognized() {
        let (company, _) = split_labeled_fields("会社名： テスト");
        assert_eq!(company, "テスト");
    }
}
