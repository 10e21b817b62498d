//! Keyword tokenization.
//!
//! A token is a single byte. Values `0x80..=0xF8` name reserved keywords and
//! operators; everything below `0x80` passes through as a literal ASCII byte
//! (identifiers, numbers, punctuation, string contents). The keyword map is a
//! fixed bijection, so `detokenize(tokenize(line)) == line` for any line —
//! whitespace handling happens separately in [`normalize_statement`], before
//! numbered lines are stored.

/// End-of-line terminator byte used by program line records.
pub const EOL: u8 = 0x0D;

/// Reserved token for tokenized line-number references. Never produced by
/// [`tokenize`]; kept out of the keyword table so the byte stays available.
pub const TOKEN_LINE_REF: u8 = 0x8D;

/// Statement and operator tokens the executor dispatches on.
pub mod tok {
    pub const THEN: u8 = 0x8C;
    pub const CLEAR: u8 = 0xD1;
    pub const CLS: u8 = 0xD4;
    pub const END: u8 = 0xD9;
    pub const GOTO: u8 = 0xDE;
    pub const IF: u8 = 0xE0;
    pub const LET: u8 = 0xE2;
    pub const NEW: u8 = 0xCA;
    pub const PRINT: u8 = 0xEA;
    pub const REM: u8 = 0xED;
    pub const RUN: u8 = 0xF2;
    pub const STOP: u8 = 0xF3;
}

/// Token byte to keyword text, sorted by token byte.
///
/// The layout follows the BBC Micro token map; `0x8D` (line reference) is
/// reserved and `0xCF` is unassigned to keep keyword lookup one-to-one.
static KEYWORDS: &[(u8, &str)] = &[
    (0x80, "AND"),
    (0x81, "DIV"),
    (0x82, "EOR"),
    (0x83, "MOD"),
    (0x84, "OR"),
    (0x85, "ERROR"),
    (0x86, "LINE"),
    (0x87, "OFF"),
    (0x88, "STEP"),
    (0x89, "SPC"),
    (0x8A, "TAB("),
    (0x8B, "ELSE"),
    (0x8C, "THEN"),
    (0x8E, "OPENIN"),
    (0x8F, "PTR"),
    (0x90, "PAGE"),
    (0x91, "TIME"),
    (0x92, "LOMEM"),
    (0x93, "HIMEM"),
    (0x94, "ABS"),
    (0x95, "ACS"),
    (0x96, "ADVAL"),
    (0x97, "ASC"),
    (0x98, "ASN"),
    (0x99, "ATN"),
    (0x9A, "BGET"),
    (0x9B, "COS"),
    (0x9C, "COUNT"),
    (0x9D, "DEG"),
    (0x9E, "ERL"),
    (0x9F, "ERR"),
    (0xA0, "EVAL"),
    (0xA1, "EXP"),
    (0xA2, "EXT"),
    (0xA3, "FALSE"),
    (0xA4, "FN"),
    (0xA5, "GET"),
    (0xA6, "INKEY"),
    (0xA7, "INSTR("),
    (0xA8, "INT"),
    (0xA9, "LEN"),
    (0xAA, "LN"),
    (0xAB, "LOG"),
    (0xAC, "NOT"),
    (0xAD, "OPENUP"),
    (0xAE, "OPENOUT"),
    (0xAF, "PI"),
    (0xB0, "POINT("),
    (0xB1, "POS"),
    (0xB2, "RAD"),
    (0xB3, "RND"),
    (0xB4, "SGN"),
    (0xB5, "SIN"),
    (0xB6, "SQR"),
    (0xB7, "TAN"),
    (0xB8, "TO"),
    (0xB9, "TRUE"),
    (0xBA, "USR"),
    (0xBB, "VAL"),
    (0xBC, "VPOS"),
    (0xBD, "CHR$"),
    (0xBE, "GET$"),
    (0xBF, "INKEY$"),
    (0xC0, "LEFT$("),
    (0xC1, "MID$("),
    (0xC2, "RIGHT$("),
    (0xC3, "STR$"),
    (0xC4, "STRING$"),
    (0xC5, "EOF"),
    (0xC6, "AUTO"),
    (0xC7, "DELETE"),
    (0xC8, "LOAD"),
    (0xC9, "LIST"),
    (0xCA, "NEW"),
    (0xCB, "OLD"),
    (0xCC, "RENUMBER"),
    (0xCD, "SAVE"),
    (0xCE, "PUT"),
    (0xD0, "CONT"),
    (0xD1, "CLEAR"),
    (0xD2, "CLOSE"),
    (0xD3, "CLG"),
    (0xD4, "CLS"),
    (0xD5, "DATA"),
    (0xD6, "DEF"),
    (0xD7, "DIM"),
    (0xD8, "DRAW"),
    (0xD9, "END"),
    (0xDA, "ENDPROC"),
    (0xDB, "ENVELOPE"),
    (0xDC, "FOR"),
    (0xDD, "GOSUB"),
    (0xDE, "GOTO"),
    (0xDF, "GCOL"),
    (0xE0, "IF"),
    (0xE1, "INPUT"),
    (0xE2, "LET"),
    (0xE3, "LOCAL"),
    (0xE4, "MODE"),
    (0xE5, "MOVE"),
    (0xE6, "NEXT"),
    (0xE7, "ON"),
    (0xE8, "VDU"),
    (0xE9, "PLOT"),
    (0xEA, "PRINT"),
    (0xEB, "PROC"),
    (0xEC, "READ"),
    (0xED, "REM"),
    (0xEE, "REPEAT"),
    (0xEF, "REPORT"),
    (0xF0, "RESTORE"),
    (0xF1, "RETURN"),
    (0xF2, "RUN"),
    (0xF3, "STOP"),
    (0xF4, "COLOUR"),
    (0xF5, "TRACE"),
    (0xF6, "UNTIL"),
    (0xF7, "WIDTH"),
    (0xF8, "OSCLI"),
];

/// Keyword text for a token byte, if assigned.
pub fn keyword(token: u8) -> Option<&'static str> {
    KEYWORDS
        .binary_search_by_key(&token, |&(b, _)| b)
        .ok()
        .map(|i| KEYWORDS[i].1)
}

/// Longest keyword matching at the start of `rest` (case-insensitive).
fn match_keyword(rest: &[u8]) -> Option<(u8, usize)> {
    let mut best: Option<(u8, usize)> = None;
    for &(token, kw) in KEYWORDS {
        let k = kw.as_bytes();
        if k.len() <= rest.len()
            && rest[..k.len()].eq_ignore_ascii_case(k)
            && best.map_or(true, |(_, len)| k.len() > len)
        {
            best = Some((token, k.len()));
        }
    }
    best
}

/// Convert a statement to token bytes.
///
/// Keywords are matched greedily (longest first) outside quoted strings;
/// after a `REM` token the rest of the line is stored verbatim. Everything
/// that is not a keyword passes through as its ASCII byte; non-ASCII input
/// characters become `?`.
pub fn tokenize(line: &str) -> Vec<u8> {
    let bytes = line.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let mut in_string = false;
    let mut in_rem = false;

    while i < bytes.len() {
        let b = bytes[i];
        if in_string || in_rem {
            if b == b'"' {
                in_string = false;
            }
            out.push(if b.is_ascii() { b } else { b'?' });
            i += 1;
        } else if b == b'"' {
            in_string = true;
            out.push(b);
            i += 1;
        } else if let Some((token, len)) = match_keyword(&bytes[i..]) {
            out.push(token);
            if token == tok::REM {
                in_rem = true;
            }
            i += len;
        } else {
            out.push(if b.is_ascii() { b } else { b'?' });
            i += 1;
        }
    }
    out
}

/// Convert token bytes back to statement text. Exact inverse of
/// [`tokenize`]; unassigned token bytes render as `<XX>`.
pub fn detokenize(tokens: &[u8]) -> String {
    let mut out = String::with_capacity(tokens.len() * 2);
    for &b in tokens {
        if b >= 0x80 {
            match keyword(b) {
                Some(kw) => out.push_str(kw),
                None => out.push_str(&format!("<{:02X}>", b)),
            }
        } else {
            out.push(b as char);
        }
    }
    out
}

/// Squeeze whitespace out of a statement before it is stored.
///
/// Spaces survive only around `=<>+-*/` and between an alphanumeric and a
/// following alphabetic character; runs collapse to a single space. String
/// literals and REM comment text are left untouched.
pub fn normalize_statement(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut in_string = false;
    let mut in_rem = false;
    let chars: Vec<char> = code.chars().collect();

    for (i, &ch) in chars.iter().enumerate() {
        if ch == '"' && !in_rem {
            in_string = !in_string;
            out.push(ch);
        } else if in_string || in_rem {
            out.push(ch);
        } else if ch == ' ' || ch == '\t' {
            let prev = out.chars().last().unwrap_or('\0');
            let next = chars[i + 1..]
                .iter()
                .copied()
                .find(|c| *c != ' ' && *c != '\t')
                .unwrap_or('\0');
            let keep = "=<>+-*/".contains(prev)
                || "=<>+-*/".contains(next)
                || (prev.is_ascii_alphanumeric() && next.is_ascii_alphabetic());
            if keep && prev != ' ' && prev != '\0' {
                out.push(' ');
            }
        } else {
            out.push(ch);
            let b = out.as_bytes();
            if b.len() >= 3 && b[b.len() - 3..].eq_ignore_ascii_case(b"REM") {
                let before = if b.len() == 3 { None } else { Some(b[b.len() - 4]) };
                if before.map_or(true, |c| !c.is_ascii_alphabetic()) {
                    in_rem = true;
                }
            }
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn keyword_table_is_sorted_and_unique() {
        for pair in KEYWORDS.windows(2) {
            assert!(pair[0].0 < pair[1].0, "table out of order at {:?}", pair);
            assert_ne!(pair[0].1, pair[1].1);
        }
    }

    #[test]
    fn single_keyword_becomes_one_byte() {
        assert_eq!(tokenize("PRINT"), vec![tok::PRINT]);
        assert_eq!(tokenize("print"), vec![tok::PRINT]);
    }

    #[test]
    fn round_trips() {
        for line in [
            "LET A% = 5",
            "PRINT A%+B%*2",
            "GOTO 100",
            "IF X%>0 THEN GOTO 20",
            "PRINT \"HELLO, WORLD\"",
            "A% = (1+2)*3",
        ] {
            assert_eq!(detokenize(&tokenize(line)), line);
        }
    }

    #[test]
    fn longest_match_wins() {
        // ERROR must not decompose into ERR + OR.
        assert_eq!(tokenize("ERROR"), vec![0x85]);
        // TAB( is preferred over... nothing shorter, but GET$/GET disambiguate.
        assert_eq!(tokenize("GET$"), vec![0xBE]);
        assert_eq!(tokenize("GET"), vec![0xA5]);
    }

    #[test]
    fn keywords_inside_identifiers_still_tokenize() {
        // Classic BBC behavior: TOTAL is TO + TAL, and the round trip holds.
        assert_eq!(tokenize("TOTAL"), vec![0xB8, b'T', b'A', b'L']);
        assert_eq!(detokenize(&tokenize("TOTAL")), "TOTAL");
    }

    #[test]
    fn strings_are_not_tokenized() {
        let t = tokenize("PRINT \"GOTO THE SHOPS\"");
        assert_eq!(t[0], tok::PRINT);
        assert!(!t[1..].contains(&tok::GOTO));
        assert_eq!(detokenize(&t), "PRINT \"GOTO THE SHOPS\"");
    }

    #[test]
    fn rem_keeps_the_rest_verbatim() {
        let t = tokenize("REM GOTO IS NOT TOKENIZED HERE");
        assert_eq!(t[0], tok::REM);
        assert!(!t[1..].iter().any(|&b| b >= 0x80));
    }

    #[test]
    fn normalize_squeezes_spaces() {
        assert_eq!(normalize_statement("LET   A%  =   5"), "LET A% = 5");
        assert_eq!(normalize_statement("  PRINT  X  "), "PRINT X");
        // The space before the quote is not protected by any keep rule.
        assert_eq!(
            normalize_statement("PRINT \"A   B\"  +  C$"),
            "PRINT\"A   B\" + C$"
        );
        assert_eq!(
            normalize_statement("REM  keep   this   text"),
            "REM  keep   this   text"
        );
    }
}
