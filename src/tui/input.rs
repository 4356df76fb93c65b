use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Bytes a terminal would send for `key`, or `None` for keys with no encoding.
pub fn encode_key(key: &KeyEvent) -> Option<Vec<u8>> {
    let alt = key.modifiers.contains(KeyModifiers::ALT);
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let superkey = key.modifiers.contains(KeyModifiers::SUPER);

    let data = match key.code {
        KeyCode::Esc => vec![0x1b],
        KeyCode::BackTab => b"\x1b[Z".to_vec(),
        KeyCode::Char(c) if ctrl && c.is_ascii() => vec![(c as u8) & 0x1f],
        KeyCode::Char(c) => {
            let mut data = Vec::with_capacity(5);
            if alt {
                data.push(0x1b);
            }
            let mut buf = [0u8; 4];
            data.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            data
        }
        KeyCode::Enter => vec![b'\r'],
        KeyCode::Backspace if alt => vec![0x1b, 0x7f],
        KeyCode::Backspace if superkey => vec![0x15],
        KeyCode::Backspace => vec![0x7f],
        KeyCode::Delete if alt => vec![0x1b, b'd'],
        KeyCode::Delete => b"\x1b[3~".to_vec(),
        KeyCode::Tab => vec![b'\t'],
        KeyCode::Up if alt => b"\x1b[1;3A".to_vec(),
        KeyCode::Up => b"\x1b[A".to_vec(),
        KeyCode::Down if alt => b"\x1b[1;3B".to_vec(),
        KeyCode::Down => b"\x1b[B".to_vec(),
        KeyCode::Right if alt => vec![0x1b, b'f'],
        KeyCode::Right if superkey => vec![0x05],
        KeyCode::Right => b"\x1b[C".to_vec(),
        KeyCode::Left if alt => vec![0x1b, b'b'],
        KeyCode::Left if superkey => vec![0x01],
        KeyCode::Left => b"\x1b[D".to_vec(),
        KeyCode::Home => vec![0x01],
        KeyCode::End => vec![0x05],
        KeyCode::PageUp => b"\x1b[5~".to_vec(),
        KeyCode::PageDown => b"\x1b[6~".to_vec(),
        KeyCode::Insert => b"\x1b[2~".to_vec(),
        KeyCode::F(n) => function_key(n)?,
        _ => return None,
    };
    Some(data)
}

fn function_key(n: u8) -> Option<Vec<u8>> {
    let seq: &[u8] = match n {
        1 => b"\x1bOP",
        2 => b"\x1bOQ",
        3 => b"\x1bOR",
        4 => b"\x1bOS",
        5 => b"\x1b[15~",
        6 => b"\x1b[17~",
        7 => b"\x1b[18~",
        8 => b"\x1b[19~",
        9 => b"\x1b[20~",
        10 => b"\x1b[21~",
        11 => b"\x1b[23~",
        12 => b"\x1b[24~",
        _ => return None,
    };
    Some(seq.to_vec())
}
