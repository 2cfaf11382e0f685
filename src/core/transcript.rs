use chrono::{DateTime, Local};

/// Who authored a turn. Only the two conversational roles exist; status and
/// log output never enter the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }

    pub fn is_assistant(self) -> bool {
        self == Role::Assistant
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// One exchange unit. Content is immutable once the turn is recorded; the
/// timestamp is taken when the turn completes, not when it starts.
#[derive(Debug, Clone)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Local>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Local>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, Local::now())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, Local::now())
    }

    /// Render the turn in the persisted line format.
    ///
    /// Embedded newlines in content are written through untouched, so a
    /// multi-line assistant turn spans several physical lines in the output
    /// file while still counting as one logical line.
    pub fn to_line(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.role.as_str(),
            self.content
        )
    }
}

/// Point-in-time turn counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TranscriptSummary {
    pub total: usize,
    pub user: usize,
    pub assistant: usize,
}

/// Ordered log of turns for one chat session.
///
/// Grows without bound for the session's lifetime; the only way to shrink it
/// is an explicit clear.
#[derive(Debug, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// One line per turn, in append order.
    pub fn serialize_lines(&self) -> Vec<String> {
        self.turns.iter().map(Turn::to_line).collect()
    }

    pub fn summary(&self) -> TranscriptSummary {
        let user = self.turns.iter().filter(|t| t.role.is_user()).count();
        let assistant = self.turns.iter().filter(|t| t.role.is_assistant()).count();
        TranscriptSummary {
            total: self.turns.len(),
            user,
            assistant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 30, 5).unwrap()
    }

    #[test]
    fn lines_match_the_persisted_format() {
        let mut transcript = Transcript::new();
        transcript.append(Turn::new(Role::User, "hi", fixed_time()));
        transcript.append(Turn::new(Role::Assistant, "hello", fixed_time()));

        let lines = transcript.serialize_lines();
        assert_eq!(
            lines,
            vec![
                "[2024-03-09 14:30:05] User: hi".to_string(),
                "[2024-03-09 14:30:05] Assistant: hello".to_string(),
            ]
        );
    }

    #[test]
    fn lines_preserve_append_order() {
        let mut transcript = Transcript::new();
        for i in 0..5 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            transcript.append(Turn::new(role, format!("turn {i}"), fixed_time()));
        }

        let lines = transcript.serialize_lines();
        assert_eq!(lines.len(), 5);
        for (i, line) in lines.iter().enumerate() {
            assert!(line.ends_with(&format!("turn {i}")), "line {i} out of order: {line}");
        }
    }

    #[test]
    fn multiline_content_is_not_escaped() {
        let turn = Turn::new(Role::Assistant, "first\nsecond", fixed_time());
        let line = turn.to_line();
        assert_eq!(line, "[2024-03-09 14:30:05] Assistant: first\nsecond");
    }

    #[test]
    fn clear_resets_all_counts() {
        let mut transcript = Transcript::new();
        transcript.append(Turn::new(Role::User, "hi", fixed_time()));
        transcript.append(Turn::new(Role::Assistant, "hello", fixed_time()));
        transcript.clear();

        assert!(transcript.is_empty());
        assert_eq!(transcript.summary(), TranscriptSummary::default());
    }

    #[test]
    fn summary_counts_roles_separately() {
        let mut transcript = Transcript::new();
        transcript.append(Turn::new(Role::User, "a", fixed_time()));
        transcript.append(Turn::new(Role::Assistant, "b", fixed_time()));
        transcript.append(Turn::new(Role::User, "c", fixed_time()));

        let summary = transcript.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.user, 2);
        assert_eq!(summary.assistant, 1);
    }
}
