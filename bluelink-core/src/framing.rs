/// Splits the bluetoothctl stdout stream into lines.
///
/// Agent prompts (`Confirm passkey 123456 (yes/no): `, `Enter PIN code: `) are
/// written without a newline while bluetoothctl waits for an answer, so such a
/// trailing fragment is released as a line of its own.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: String,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.pending.push_str(chunk);

        let mut lines = Vec::new();
        while let Some(end) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=end).collect();
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }

        if is_agent_prompt(&self.pending) {
            lines.push(std::mem::take(&mut self.pending));
        }

        lines
    }

    /// Whatever is left once the stream has closed.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

fn is_agent_prompt(fragment: &str) -> bool {
    let fragment = fragment.trim_end();
    fragment.ends_with(':')
        && (fragment.contains("(yes/no)") || fragment.to_ascii_lowercase().contains("pin code"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_complete_lines() {
        let mut splitter = LineSplitter::new();
        assert_eq!(
            splitter.push("Pairing successful\r\n[CHG] Device AA:BB:CC:DD:EE:FF Paired: yes\n"),
            vec![
                "Pairing successful".to_string(),
                "[CHG] Device AA:BB:CC:DD:EE:FF Paired: yes".to_string()
            ]
        );
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn test_joins_fragments_across_chunks() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.push("[NEW] Device AA:BB").is_empty());
        assert_eq!(
            splitter.push(":CC:DD:EE:FF Phone\n"),
            vec!["[NEW] Device AA:BB:CC:DD:EE:FF Phone".to_string()]
        );
    }

    #[test]
    fn test_releases_agent_prompt_without_newline() {
        let mut splitter = LineSplitter::new();
        assert_eq!(
            splitter.push("[agent] Confirm passkey 123456 (yes/no): "),
            vec!["[agent] Confirm passkey 123456 (yes/no): ".to_string()]
        );
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn test_holds_fragment_split_inside_mac() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.push("[CHG] Device AA:BB:").is_empty());
        assert_eq!(splitter.push("CC:DD:EE:FF Connected: yes\n").len(), 1);
    }

    #[test]
    fn test_finish_returns_tail() {
        let mut splitter = LineSplitter::new();
        splitter.push("Agent regis");
        assert_eq!(splitter.finish(), Some("Agent regis".to_string()));
    }
}
