use std::io;

use skim::prelude::{SkimItemReader, SkimOptionsBuilder};
use skim::Skim;

use crate::error::Result;

/// Interactive choice among labeled entries. One instance is shared by every
/// nested wizard step (account, then role, then secret item) so only one
/// prompter ever touches the terminal.
pub trait SelectItem: Send + Sync {
    /// Returns the index of the chosen entry, or `None` when the user aborts.
    fn select(&self, title: &str, entries: &[String]) -> Result<Option<usize>>;
}

/// Fuzzy selector over the terminal.
pub struct SkimSelector;

impl SelectItem for SkimSelector {
    fn select(&self, title: &str, entries: &[String]) -> Result<Option<usize>> {
        if entries.is_empty() {
            return Ok(None);
        }

        let item_reader = SkimItemReader::default();
        let items = item_reader.of_bufread(io::Cursor::new(entries.join("\n")));

        let prompt = format!("{}> ", title);
        let options = SkimOptionsBuilder::default()
            .reverse(true)
            .prompt(Some(&prompt))
            .build()
            .map_err(anyhow::Error::msg)?;
        let selected = Skim::run_with(&options, Some(items))
            .and_then(|out| (!out.is_abort).then_some(out.selected_items))
            .unwrap_or_default();

        let chosen = selected.into_iter().next().map(|item| item.output().to_string());
        Ok(chosen.and_then(|text| entries.iter().position(|entry| *entry == text)))
    }
}

/// Always picks a fixed index (clamped). For tests and non-interactive runs.
pub struct StaticSelector {
    choice: usize,
}

impl StaticSelector {
    pub fn first() -> Self {
        StaticSelector { choice: 0 }
    }

    pub fn nth(choice: usize) -> Self {
        StaticSelector { choice }
    }
}

impl SelectItem for StaticSelector {
    fn select(&self, _title: &str, entries: &[String]) -> Result<Option<usize>> {
        if entries.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.choice.min(entries.len() - 1)))
        }
    }
}

/// How the federated driver resolves the target (account, role) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Use the profile's pinned pair without asking.
    Pinned,
    /// Offer a selection with the pinned pair as the default candidate.
    PromptWithConfirm,
    /// Ask unconditionally, ignoring pins and cached children.
    ForcePrompt,
    /// No pin and nothing requested: take the first enumerated pair.
    DefaultFirst,
}

/// Pure decision over the `--select`/`--change` flags and the presence of a
/// pinned target.
pub fn selection_policy(select: bool, change: bool, pinned: bool) -> SelectionPolicy {
    if change {
        SelectionPolicy::ForcePrompt
    } else if select {
        if pinned {
            SelectionPolicy::PromptWithConfirm
        } else {
            SelectionPolicy::ForcePrompt
        }
    } else if pinned {
        SelectionPolicy::Pinned
    } else {
        SelectionPolicy::DefaultFirst
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_always_forces_a_prompt() {
        assert_eq!(selection_policy(false, true, true), SelectionPolicy::ForcePrompt);
        assert_eq!(selection_policy(true, true, false), SelectionPolicy::ForcePrompt);
    }

    #[test]
    fn select_confirms_an_existing_pin() {
        assert_eq!(
            selection_policy(true, false, true),
            SelectionPolicy::PromptWithConfirm
        );
        assert_eq!(selection_policy(true, false, false), SelectionPolicy::ForcePrompt);
    }

    #[test]
    fn plain_login_trusts_the_pin() {
        assert_eq!(selection_policy(false, false, true), SelectionPolicy::Pinned);
        assert_eq!(
            selection_policy(false, false, false),
            SelectionPolicy::DefaultFirst
        );
    }

    #[test]
    fn static_selector_clamps_to_the_last_entry() {
        let entries = vec!["a".to_string(), "b".to_string()];
        assert_eq!(StaticSelector::nth(9).select("t", &entries).unwrap(), Some(1));
        assert_eq!(StaticSelector::first().select("t", &[]).unwrap(), None);
    }
}
