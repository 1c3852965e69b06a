use std::sync::Arc;

use super::types::{Configuration, ConfigurationDraft, Rule, SessionStats, ValidationError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Page {
    #[default]
    Description,
    Config,
    Monitoring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleList {
    Allow,
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Invalid(ValidationError),
    GenerationFailed(String),
    /// Screen sharing was refused; the user may retry or cancel.
    PermissionDenied(String),
}

#[derive(Debug, Clone)]
pub enum ShellEvent {
    DescriptionSubmitted(String),
    ConfigurationGenerated(ConfigurationDraft),
    GenerationFailed(String),
    TokenEdited(String),
    RuleAdded(RuleList, Rule),
    RuleRemoved(RuleList, usize),
    MonitoringRequested,
    PermissionDenied(String),
    Retry,
    Cancel,
    StatsUpdated(SessionStats),
    Stopped,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShellState {
    page: Page,
    description: String,
    generating: bool,
    draft: Option<ConfigurationDraft>,
    token: String,
    session: Option<Arc<Configuration>>,
    stats: SessionStats,
    notice: Option<Notice>,
}

impl ShellState {
    pub fn new(stored_token: Option<String>) -> Self {
        Self {
            token: stored_token.unwrap_or_default(),
            ..Self::default()
        }
    }

    pub fn page(&self) -> Page {
        self.page
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    #[cfg(test)]
    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn draft(&self) -> Option<&ConfigurationDraft> {
        self.draft.as_ref()
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn session(&self) -> Option<&Arc<Configuration>> {
        self.session.as_ref()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn apply(&self, event: ShellEvent) -> ShellState {
        let mut next = self.clone();
        match event {
            ShellEvent::DescriptionSubmitted(text) => {
                if next.page != Page::Description || next.generating {
                    return next;
                }
                let text = text.trim();
                if text.is_empty() {
                    next.notice = Some(Notice::Invalid(ValidationError::MissingDescription));
                } else {
                    next.description = text.to_string();
                    next.generating = true;
                    next.notice = None;
                }
            }
            ShellEvent::ConfigurationGenerated(draft) => {
                if next.generating {
                    next.generating = false;
                    next.draft = Some(draft);
                    next.page = Page::Config;
                    next.notice = None;
                }
            }
            ShellEvent::GenerationFailed(message) => {
                if next.generating {
                    next.generating = false;
                    next.notice = Some(Notice::GenerationFailed(message));
                }
            }
            ShellEvent::TokenEdited(token) => {
                if next.page != Page::Monitoring {
                    next.token = token;
                    if next.notice == Some(Notice::Invalid(ValidationError::MissingToken)) {
                        next.notice = None;
                    }
                }
            }
            ShellEvent::RuleAdded(list, rule) => {
                if next.page == Page::Config {
                    if let Some(draft) = next.draft.as_mut() {
                        rules_mut(draft, list).push(rule);
                    }
                }
            }
            ShellEvent::RuleRemoved(list, index) => {
                if next.page == Page::Config {
                    if let Some(draft) = next.draft.as_mut() {
                        let rules = rules_mut(draft, list);
                        if index < rules.len() {
                            rules.remove(index);
                        }
                    }
                }
            }
            ShellEvent::MonitoringRequested => next.request_monitoring(),
            ShellEvent::PermissionDenied(message) => {
                if next.page == Page::Monitoring {
                    next.page = Page::Config;
                    next.session = None;
                    next.stats = SessionStats::default();
                    next.notice = Some(Notice::PermissionDenied(message));
                }
            }
            ShellEvent::Retry => {
                if matches!(next.notice, Some(Notice::PermissionDenied(_))) {
                    next.notice = None;
                    next.request_monitoring();
                }
            }
            ShellEvent::Cancel => {
                if matches!(next.notice, Some(Notice::PermissionDenied(_))) {
                    next.notice = None;
                }
            }
            ShellEvent::StatsUpdated(stats) => {
                if next.page == Page::Monitoring {
                    next.stats = stats;
                }
            }
            ShellEvent::Stopped => {
                next = ShellState::new(Some(next.token));
            }
        }
        next
    }

    fn request_monitoring(&mut self) {
        if self.page != Page::Config {
            return;
        }
        let draft = self.draft.clone().unwrap_or_default();
        match Configuration::new(draft, &self.token) {
            Ok(configuration) => {
                self.token = configuration.stimulus_token().to_string();
                self.session = Some(Arc::new(configuration));
                self.stats = SessionStats::default();
                self.page = Page::Monitoring;
                self.notice = None;
            }
            Err(err) => self.notice = Some(Notice::Invalid(err)),
        }
    }
}

fn rules_mut(draft: &mut ConfigurationDraft, list: RuleList) -> &mut Vec<Rule> {
    match list {
        RuleList::Allow => &mut draft.allowlist,
        RuleList::Block => &mut draft.blocklist,
    }
}
