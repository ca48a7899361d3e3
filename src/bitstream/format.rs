use crate::error::{BitResult, BitstreamError};

/// One action of the format mini-language (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatAction {
    Unsigned(u32),
    Signed(u32),
    U64(u32),
    S64(u32),
    BigUnsigned(u32),
    BigSigned(u32),
    SkipBits(u32),
    SkipBytes(u32),
    Bytes(u32),
    Align,
}

/// Parses a format string such as `"2u 3u 5s 3u 19U 16b"` into a flat
/// list of actions, expanding `N*` repeat prefixes (`"4* 8s"` becomes
/// four `Signed(8)` actions). Whitespace is ignored; an unrecognized
/// action code fails with `BadFormat` without partially consuming the
/// string's effect (the whole string is parsed up front, before any
/// reader/writer call touches the stream).
pub fn parse_format(fmt: &str) -> BitResult<Vec<FormatAction>> {
    let mut actions = Vec::new();
    let mut chars = fmt.chars().peekable();
    let mut repeat: u32 = 1;

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c.is_ascii_digit() {
            let mut n: u32 = 0;
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() {
                    n = n * 10 + d.to_digit(10).unwrap();
                    chars.next();
                } else {
                    break;
                }
            }
            match chars.peek() {
                Some('*') => {
                    chars.next();
                    repeat = n;
                    continue;
                }
                Some(&code) => {
                    chars.next();
                    push_action(&mut actions, code, n, repeat)?;
                    repeat = 1;
                }
                None => return Err(BitstreamError::BadFormat('\0')),
            }
        } else {
            chars.next();
            push_action(&mut actions, c, 0, repeat)?;
            repeat = 1;
        }
    }

    Ok(actions)
}

fn push_action(actions: &mut Vec<FormatAction>, code: char, n: u32, repeat: u32) -> BitResult<()> {
    let action = match code {
        'u' => FormatAction::Unsigned(n),
        's' => FormatAction::Signed(n),
        'U' => FormatAction::U64(n),
        'S' => FormatAction::S64(n),
        'K' => FormatAction::BigUnsigned(n),
        'L' => FormatAction::BigSigned(n),
        'p' => FormatAction::SkipBits(n),
        'P' => FormatAction::SkipBytes(n),
        'b' => FormatAction::Bytes(n),
        'a' => FormatAction::Align,
        other => return Err(BitstreamError::BadFormat(other)),
    };
    for _ in 0..repeat {
        actions.push(action);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_actions() {
        let actions = parse_format("2u 3u 5s 3u 19U 16b").unwrap();
        assert_eq!(
            actions,
            vec![
                FormatAction::Unsigned(2),
                FormatAction::Unsigned(3),
                FormatAction::Signed(5),
                FormatAction::Unsigned(3),
                FormatAction::U64(19),
                FormatAction::Bytes(16),
            ]
        );
    }

    #[test]
    fn expands_repeat_prefix() {
        let actions = parse_format("4* 8s").unwrap();
        assert_eq!(actions, vec![FormatAction::Signed(8); 4]);
    }

    #[test]
    fn rejects_unknown_code() {
        let err = parse_format("3z").unwrap_err();
        assert!(matches!(err, BitstreamError::BadFormat('z')));
    }

    #[test]
    fn align_and_skip_take_no_count_prefix() {
        let actions = parse_format("a P 4P").unwrap();
        assert_eq!(
            actions,
            vec![
                FormatAction::Align,
                FormatAction::SkipBytes(0),
                FormatAction::SkipBytes(4),
            ]
        );
    }
}
