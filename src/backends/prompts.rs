//! Prompt table for vision-model extraction.
//!
//! Keyed by (model tier, field type). Lite-tier models follow instructions
//! better when the prompt is short and imperative; the standard tier gets the
//! fuller phrasing. This is data, not logic.

use crate::models::FieldType;

const PHONE_PROMPT: &str = "この画像には電話番号が含まれています。画像内の電話番号をすべて読み取り、\
カンマ区切りで出力してください。ハイフンはそのまま残してください。\
電話番号以外の文字や説明は一切出力しないでください。";

const PHONE_PROMPT_LITE: &str = "画像内の電話番号をすべて読み取り、カンマ区切りで出力。番号のみ。";

const PAYEE_PROMPT: &str = "この画像は請求書・領収書・名刺などの一部です。\
会社名(または団体名)と電話番号を読み取り、次の形式で出力してください。\n\
会社名: <読み取った会社名>\n\
電話番号: <読み取った電話番号>\n\
見つからない項目は空欄のままにしてください。説明文は不要です。";

const PAYEE_PROMPT_LITE: &str = "画像から会社名と電話番号を読み取り、\
「会社名: 」「電話番号: 」の2行で出力。説明不要。";

const FREEFORM_PROMPT: &str = "画像内のテキストをすべて読み取り、そのまま出力してください。\
レイアウトの説明や整形、補足は不要です。";

const FREEFORM_PROMPT_LITE: &str = "画像内のテキストをそのまま出力。説明不要。";

/// Model names that get the terse prompt variants.
fn is_lite_model(model: &str) -> bool {
    let lowered = model.to_lowercase();
    lowered.contains("lite") || lowered.contains("gemma") || lowered.contains("mini")
}

/// Look up the instruction for a (model, field type) pair.
///
/// Phonetic and clipboard extraction use the freeform variant; their shaping
/// happens in post-processing, not in the prompt.
pub fn prompt_for(model: &str, field_type: Option<FieldType>) -> &'static str {
    let lite = is_lite_model(model);
    match field_type {
        Some(FieldType::PhoneNumber) => {
            if lite {
                PHONE_PROMPT_LITE
            } else {
                PHONE_PROMPT
            }
        }
        Some(FieldType::PayeeName) => {
            if lite {
                PAYEE_PROMPT_LITE
            } else {
                PAYEE_PROMPT
            }
        }
        _ => {
            if lite {
                FREEFORM_PROMPT_LITE
            } else {
                FREEFORM_PROMPT
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payee_prompt_requests_labeled_lines() {
        let prompt = prompt_for("gemini-2.0-flash", Some(FieldType::PayeeName));
        assert!(prompt.contains("会社名:"));
        assert!(prompt.contains("電話番号:"));
    }

    #[test]
    fn lite_models_get_terse_variants() {
        let standard = prompt_for("gemini-2.0-flash", Some(FieldType::PhoneNumber));
        let lite = prompt_for("gemini-2.0-flash-lite", Some(FieldType::PhoneNumber));
        assert!(lite.len() < standard.len());
        assert!(prompt_for("gemma-3-4b", None).len() < prompt_for("gemini-2.0-flash", None).len());
    }

    #[test]
    fn phonetic_and_clipboard_use_freeform() {
        assert_eq!(
            prompt_for("m", Some(FieldType::Phonetic)),
            prompt_for("m", Some(FieldType::Freeform))
        );
        assert_eq!(
            prompt_for("m", Some(FieldType::Clipboard)),
            prompt_for("m", None)
        );
    }
}
