//! Line splitting for streamed provider responses.
//!
//! Network chunks can end anywhere, including inside a multi-byte UTF-8
//! character. Bytes are carried until a `\n` completes the line, and only
//! complete lines are decoded.

/// Byte carry buffer yielding complete, decoded lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    carry: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completes, without the
    /// trailing `\n` or `\r\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);

        let Some(last_newline) = self.carry.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let rest = self.carry.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.carry, rest);

        complete[..last_newline]
            .split(|&b| b == b'\n')
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect()
    }

    /// Bytes still waiting for a line terminator.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn character_split_across_chunks_survives() {
        let frame = "data: {\"text\":\"22°C\"}\n".as_bytes();
        let degree = frame.iter().position(|&b| b == 0xC2).unwrap();

        let mut lines = LineBuffer::new();
        assert!(lines.push(&frame[..degree + 1]).is_empty());
        assert_eq!(lines.pending(), degree + 1);

        let out = lines.push(&frame[degree + 1..]);
        assert_eq!(out, vec!["data: {\"text\":\"22°C\"}"]);
        assert_eq!(lines.pending(), 0);
    }

    #[test]
    fn several_lines_in_one_chunk() {
        let mut lines = LineBuffer::new();
        let out = lines.push(b"event: ping\r\ndata: 1\n\ndata: 2");
        assert_eq!(out, vec!["event: ping", "data: 1", ""]);

        assert_eq!(lines.push(b"\n"), vec!["data: 2"]);
    }

    #[test]
    fn byte_at_a_time() {
        let text = "data: héllo wörld\n";
        let mut lines = LineBuffer::new();
        let mut out = Vec::new();
        for b in text.as_bytes() {
            out.extend(lines.push(std::slice::from_ref(b)));
        }
        assert_eq!(out, vec!["data: héllo wörld"]);
    }
}
