/// Aggregated view of questionnaire progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub total: usize,
    /// Questions of the loaded set that have an answer.
    pub answered: usize,
    pub current_index: usize,
    pub is_complete: bool,
}

impl SessionProgress {
    /// Answered share as a whole percentage, truncated.
    #[must_use]
    pub fn percent_answered(&self) -> usize {
        if self.total == 0 {
            return 0;
        }
        self.answered * 100 / self.total
    }
}
