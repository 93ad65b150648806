//! Character-width and kana canonicalization.
//!
//! OCR output mixes full-width ASCII, half-width katakana and voicing marks
//! freely. Everything downstream (phone parsing, denylist stripping, field
//! fill) assumes half-width ASCII and full-width kana, so these passes run
//! before any field-specific handling.

/// Convert full-width ASCII (U+FF01..U+FF5E) to half-width, the ideographic
/// space to a plain space, the ideographic full stop to `.`, and the katakana
/// middle dot to its half-width form.
///
/// The full-width full stop and comma inside the U+FF01 block come out as
/// `.` and `,` from the same offset.
pub fn normalize_width(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{3000}' => ' ',
            '。' => '.',
            '・' => '･',
            '\u{FF01}'..='\u{FF5E}' => {
                char::from_u32(c as u32 - 0xFEE0).unwrap_or(c)
            }
            c => c,
        })
        .collect()
}

/// Convert half-width katakana to full-width.
///
/// Two passes: the first maps every half-width code point to its full-width
/// counterpart, turning the voicing marks into the spacing marks U+309B/U+309C;
/// the second combines a mark with the preceding letter into the precomposed
/// character. Marks with no precomposed combination are left standing, which
/// is the fallback for sequences like a voiced vowel.
pub fn halfwidth_katakana_to_fullwidth(text: &str) -> String {
    let widened: String = text.chars().map(halfwidth_kana_char).collect();
    combine_voicing_marks(&widened)
}

fn halfwidth_kana_char(c: char) -> char {
    match c {
        'ｦ' => 'ヲ',
        'ｧ' => 'ァ',
        'ｨ' => 'ィ',
        'ｩ' => 'ゥ',
        'ｪ' => 'ェ',
        'ｫ' => 'ォ',
        'ｬ' => 'ャ',
        'ｭ' => 'ュ',
        'ｮ' => 'ョ',
        'ｯ' => 'ッ',
        'ｰ' => 'ー',
        'ｱ' => 'ア',
        'ｲ' => 'イ',
        'ｳ' => 'ウ',
        'ｴ' => 'エ',
        'ｵ' => 'オ',
        'ｶ' => 'カ',
        'ｷ' => 'キ',
        'ｸ' => 'ク',
        'ｹ' => 'ケ',
        'ｺ' => 'コ',
        'ｻ' => 'サ',
        'ｼ' => 'シ',
        'ｽ' => 'ス',
        'ｾ' => 'セ',
        'ｿ' => 'ソ',
        'ﾀ' => 'タ',
        'ﾁ' => 'チ',
        'ﾂ' => 'ツ',
        'ﾃ' => 'テ',
        'ﾄ' => 'ト',
        'ﾅ' => 'ナ',
        'ﾆ' => 'ニ',
        'ﾇ' => 'ヌ',
        'ﾈ' => 'ネ',
        'ﾉ' => 'ノ',
        'ﾊ' => 'ハ',
        'ﾋ' => 'ヒ',
        'ﾌ' => 'フ',
        'ﾍ' => 'ヘ',
        'ﾎ' => 'ホ',
        'ﾏ' => 'マ',
        'ﾐ' => 'ミ',
        'ﾑ' => 'ム',
        'ﾒ' => 'メ',
        'ﾓ' => 'モ',
        'ﾔ' => 'ヤ',
        'ﾕ' => 'ユ',
        'ﾖ' => 'ヨ',
        'ﾗ' => 'ラ',
        'ﾘ' => 'リ',
        'ﾙ' => 'ル',
        'ﾚ' => 'レ',
        'ﾛ' => 'ロ',
        'ﾜ' => 'ワ',
        'ﾝ' => 'ン',
        'ﾞ' => '\u{309B}',
        'ﾟ' => '\u{309C}',
        c => c,
    }
}

fn combine_voicing_marks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{309B}' => {
                if let Some(prev) = out.chars().last() {
                    if let Some(voiced) = with_dakuten(prev) {
                        out.pop();
                        out.push(voiced);
                        continue;
                    }
                }
                out.push(c);
            }
            '\u{309C}' => {
                if let Some(prev) = out.chars().last() {
                    if let Some(voiced) = with_handakuten(prev) {
                        out.pop();
                        out.push(voiced);
                        continue;
                    }
                }
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// Precomposed dakuten form, if one exists.
fn with_dakuten(c: char) -> Option<char> {
    match c {
        'カ' | 'キ' | 'ク' | 'ケ' | 'コ' | 'サ' | 'シ' | 'ス' | 'セ' | 'ソ' | 'タ' | 'チ'
        | 'ツ' | 'テ' | 'ト' | 'ハ' | 'ヒ' | 'フ' | 'ヘ' | 'ホ' => {
            char::from_u32(c as u32 + 1)
        }
        'ウ' => Some('ヴ'),
        'ワ' => Some('ヷ'),
        'ヲ' => Some('ヺ'),
        _ => None,
    }
}

/// Precomposed handakuten form, if one exists.
fn with_handakuten(c: char) -> Option<char> {
    match c {
        'ハ' | 'ヒ' | 'フ' | 'ヘ' | 'ホ' => char::from_u32(c as u32 + 2),
        _ => None,
    }
}

/// Convert katakana to hiragana by the fixed code-point offset.
///
/// Only the main block (U+30A1..U+30F6) shifts; the prolonged sound mark and
/// punctuation stay put.
pub fn katakana_to_hiragana(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{30A1}'..='\u{30F6}' => char::from_u32(c as u32 - 0x60).unwrap_or(c),
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fullwidth_ascii_becomes_halfwidth() {
        assert_eq!(normalize_width("ＡＢＣ１２３"), "ABC123");
        assert_eq!(normalize_width("０３－１２３４"), "03-1234");
    }

    #[test]
    fn fullwidth_punctuation_maps_through_block() {
        assert_eq!(normalize_width("ａ．ｂ，ｃ："), "a.b,c:");
        assert_eq!(normalize_width("終わり。"), "終わり.");
        assert_eq!(normalize_width("中・黒"), "中･黒");
        assert_eq!(normalize_width("全　角"), "全 角");
    }

    #[test]
    fn halfwidth_katakana_widens() {
        assert_eq!(halfwidth_katakana_to_fullwidth("ｱｲｳｴｵ"), "アイウエオ");
        assert_eq!(halfwidth_katakana_to_fullwidth("ﾃｽﾄ"), "テスト");
    }

    #[test]
    fn dakuten_pairs_combine_to_precomposed() {
        assert_eq!(halfwidth_katakana_to_fullwidth("ｶﾞ"), "ガ");
        assert_eq!(halfwidth_katakana_to_fullwidth("ﾊﾟ"), "パ");
        assert_eq!(halfwidth_katakana_to_fullwidth("ｳﾞ"), "ヴ");
        assert_eq!(halfwidth_katakana_to_fullwidth("ｷﾞｮｳｻﾞ"), "ギョウザ");
    }

    #[test]
    fn uncombinable_mark_is_left_standing() {
        // ﾝ has no voiced form; the mark falls back to the spacing character.
        assert_eq!(halfwidth_katakana_to_fullwidth("ﾝﾞ"), "ン\u{309B}");
    }

    #[test]
    fn katakana_to_hiragana_offset() {
        assert_eq!(katakana_to_hiragana("カブシキ"), "かぶしき");
        assert_eq!(katakana_to_hiragana("テスト"), "てすと");
        // Prolonged sound mark survives.
        assert_eq!(katakana_to_hiragana("データ"), "でーた");
    }

    #[test]
    fn conversions_are_idempotent() {
        let once = halfwidth_katakana_to_fullwidth(&normalize_width("ﾃｽﾄＡＢＣｶﾞ"));
        let twice = halfwidth_katakana_to_fullwidth(&normalize_width(&once));
        assert_eq!(once, twice);
    }
}
