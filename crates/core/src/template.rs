//! Notification templates.
//!
//! A template file holds a subject line and a body separated by the first
//! `--`. Both parts are minijinja templates (`{{ title }}`, filters, `{% if %}`)
//! compiled once at load time. Every variable a part refers to is checked
//! against [`Placeholder`] for the template's event kind, so a typo fails at
//! startup rather than rendering as an empty string.

use std::path::Path;

use minijinja::Environment;
use serde::Serialize;
use tracing::info;

use crate::errors::TemplateError;
use crate::event::EventKind;

const DELIMITER: &str = "--";

const SUBJECT: &str = "subject";
const BODY: &str = "body";

pub const THREAD_TEMPLATE_FILE: &str = "thread-action.txt";
pub const COMMENT_TEMPLATE_FILE: &str = "comment-action.txt";

// ---------------------------------------------------------------------------
// Placeholders
// ---------------------------------------------------------------------------

/// The values a template may interpolate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// Login of the author of the discussion or comment.
    User,
    Title,
    /// Category slug of the discussion.
    Category,
    /// Discussion URL, or comment URL for comment templates.
    Url,
    Body,
    Recipient,
    /// Unsubscribe address derived from the recipient.
    Unsub,
    Action,
    /// Human-readable comment action, e.g. "edited a comment on the discussion:".
    ActionHuman,
    Repo,
    NodeId,
}

impl Placeholder {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "user" => Self::User,
            "title" => Self::Title,
            "category" => Self::Category,
            "url" => Self::Url,
            "body" => Self::Body,
            "recipient" => Self::Recipient,
            "unsub" => Self::Unsub,
            "action" => Self::Action,
            "action_human" => Self::ActionHuman,
            "repo" => Self::Repo,
            "node_id" => Self::NodeId,
            _ => return None,
        })
    }

    pub fn allowed_in(&self, kind: EventKind) -> bool {
        !matches!((self, kind), (Self::ActionHuman, EventKind::Thread))
    }
}

/// Values substituted into a template. Field names match [`Placeholder`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RenderContext<'a> {
    pub user: &'a str,
    pub title: &'a str,
    pub category: &'a str,
    pub url: &'a str,
    pub body: &'a str,
    pub recipient: &'a str,
    pub unsub: &'a str,
    pub action: &'a str,
    pub action_human: &'a str,
    pub repo: &'a str,
    pub node_id: &'a str,
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// A compiled subject/body template.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    kind: EventKind,
    env: Environment<'static>,
}

/// Rendered subject and body, both trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedText {
    pub subject: String,
    pub body: String,
}

impl Template {
    /// Compile template text for events of `kind`.
    pub fn parse(name: &str, kind: EventKind, text: &str) -> Result<Self, TemplateError> {
        let (subject, body) =
            text.split_once(DELIMITER)
                .ok_or_else(|| TemplateError::MissingDelimiter {
                    name: name.to_string(),
                })?;

        let mut env = Environment::new();
        for (part, source) in [(SUBJECT, subject), (BODY, body)] {
            env.add_template_owned(part, source.to_string())
                .map_err(|source| TemplateError::Syntax {
                    name: name.to_string(),
                    source,
                })?;
        }

        let template = Self {
            name: name.to_string(),
            kind,
            env,
        };
        template.check_placeholders()?;
        Ok(template)
    }

    /// Read and compile a template file.
    pub fn load<P: AsRef<Path>>(path: P, kind: EventKind) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::parse(&name, kind, &text)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Render both parts. Fails only on runtime template errors such as an
    /// invalid operation inside an expression.
    pub fn render(&self, ctx: &RenderContext<'_>) -> Result<RenderedText, TemplateError> {
        Ok(RenderedText {
            subject: self.render_part(SUBJECT, ctx)?,
            body: self.render_part(BODY, ctx)?,
        })
    }

    fn render_part(&self, part: &str, ctx: &RenderContext<'_>) -> Result<String, TemplateError> {
        let rendered = self
            .env
            .get_template(part)
            .and_then(|t| t.render(ctx))
            .map_err(|source| TemplateError::Render {
                name: self.name.clone(),
                source,
            })?;
        Ok(rendered.trim().to_string())
    }

    fn check_placeholders(&self) -> Result<(), TemplateError> {
        for part in [SUBJECT, BODY] {
            let template = self
                .env
                .get_template(part)
                .map_err(|source| TemplateError::Syntax {
                    name: self.name.clone(),
                    source,
                })?;

            let mut names: Vec<String> = template.undeclared_variables(false).into_iter().collect();
            names.sort();
            if let Some(unknown) = names.into_iter().find(|n| {
                !Placeholder::from_name(n).is_some_and(|p| p.allowed_in(self.kind))
            }) {
                return Err(TemplateError::UnknownPlaceholder {
                    name: self.name.clone(),
                    placeholder: unknown,
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Template set
// ---------------------------------------------------------------------------

/// The two templates used by the composer. Loaded once, read-only afterwards.
#[derive(Debug, Clone)]
pub struct Templates {
    pub thread: Template,
    pub comment: Template,
}

impl Templates {
    /// Load `thread-action.txt` and `comment-action.txt` from `dir`.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self, TemplateError> {
        let dir = dir.as_ref();
        info!(dir = %dir.display(), "loading notification templates");
        Ok(Self {
            thread: Template::load(dir.join(THREAD_TEMPLATE_FILE), EventKind::Thread)?,
            comment: Template::load(dir.join(COMMENT_TEMPLATE_FILE), EventKind::Comment)?,
        })
    }

    /// Compile both templates from in-memory text.
    pub fn from_strings(thread: &str, comment: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            thread: Template::parse("thread-action", EventKind::Thread, thread)?,
            comment: Template::parse("comment-action", EventKind::Comment, comment)?,
        })
    }

    pub fn for_kind(&self, kind: EventKind) -> &Template {
        match kind {
            EventKind::Thread => &self.thread,
            EventKind::Comment => &self.comment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RenderContext<'static> {
        RenderContext {
            user: "alice",
            title: "Q",
            category: "general",
            url: "http://x/1",
            body: "hi",
            recipient: "list@example.org",
            unsub: "list-unsubscribe@example.org",
            action: "created",
            action_human: "added a comment to the discussion:",
            repo: "repo1",
            node_id: "abc",
        }
    }

    #[test]
    fn test_parse_and_render() {
        let t = Template::parse(
            "thread-action",
            EventKind::Thread,
            "[{{ repo }}] {{ user }} {{ action }}: {{ title }}\n--\n{{ body }}\n\nURL: {{ url }} ({{ category }})\nUnsubscribe: {{ unsub }}\n",
        )
        .unwrap();
        let out = t.render(&ctx()).unwrap();
        assert_eq!(out.subject, "[repo1] alice created: Q");
        assert_eq!(
            out.body,
            "hi\n\nURL: http://x/1 (general)\nUnsubscribe: list-unsubscribe@example.org"
        );
    }

    #[test]
    fn test_split_on_first_delimiter_only() {
        let t = Template::parse("t", EventKind::Thread, "{{ title }}--a -- b\n-- \nsig").unwrap();
        let out = t.render(&ctx()).unwrap();
        assert_eq!(out.subject, "Q");
        assert_eq!(out.body, "a -- b\n-- \nsig");
    }

    #[test]
    fn test_literal_braces() {
        let t = Template::parse(
            "t",
            EventKind::Thread,
            "{{ '{literal}' }} {{ title }}--{% raw %}{{ body }}{% endraw %}",
        )
        .unwrap();
        let out = t.render(&ctx()).unwrap();
        assert_eq!(out.subject, "{literal} Q");
        assert_eq!(out.body, "{{ body }}");
    }

    #[test]
    fn test_filters_and_conditionals() {
        let t = Template::parse(
            "t",
            EventKind::Thread,
            "{{ user|upper }}--{% if body %}{{ body }}{% else %}(no text){% endif %}",
        )
        .unwrap();
        let out = t.render(&ctx()).unwrap();
        assert_eq!(out.subject, "ALICE");
        assert_eq!(out.body, "hi");

        let empty = RenderContext { body: "", ..ctx() };
        assert_eq!(t.render(&empty).unwrap().body, "(no text)");
    }

    #[test]
    fn test_missing_delimiter() {
        let err = Template::parse("t", EventKind::Thread, "subject only").unwrap_err();
        assert!(matches!(err, TemplateError::MissingDelimiter { .. }));
    }

    #[test]
    fn test_unknown_placeholder_rejected_at_load() {
        let err = Template::parse("t", EventKind::Thread, "{{ title }}--{{ bogus }}").unwrap_err();
        assert!(matches!(
            err,
            TemplateError::UnknownPlaceholder { ref placeholder, .. } if placeholder == "bogus"
        ));
    }

    #[test]
    fn test_loop_variables_are_not_placeholders() {
        let t = Template::parse(
            "t",
            EventKind::Thread,
            "{{ title }}--{% for field in [user, repo] %}[{{ field }}]{% endfor %}",
        )
        .unwrap();
        assert_eq!(t.render(&ctx()).unwrap().body, "[alice][repo1]");
    }

    #[test]
    fn test_action_human_only_in_comment_templates() {
        assert!(matches!(
            Template::parse("t", EventKind::Thread, "{{ action_human }}--x"),
            Err(TemplateError::UnknownPlaceholder { ref placeholder, .. }) if placeholder == "action_human"
        ));
        assert!(Template::parse("t", EventKind::Comment, "{{ action_human }}--x").is_ok());
    }

    #[test]
    fn test_syntax_errors_rejected_at_load() {
        assert!(matches!(
            Template::parse("t", EventKind::Thread, "{{ title --x"),
            Err(TemplateError::Syntax { .. })
        ));
        assert!(matches!(
            Template::parse("t", EventKind::Thread, "{% if title %}subject--x"),
            Err(TemplateError::Syntax { .. })
        ));
    }

    #[test]
    fn test_runtime_error_surfaces_from_render() {
        let t = Template::parse("t", EventKind::Thread, "{{ title + 1 }}--x").unwrap();
        assert!(matches!(
            t.render(&ctx()),
            Err(TemplateError::Render { ref name, .. }) if name == "t"
        ));
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(THREAD_TEMPLATE_FILE),
            "{{ title }}\n--\n{{ body }}",
        )
        .unwrap();
        std::fs::write(
            dir.path().join(COMMENT_TEMPLATE_FILE),
            "Re: {{ title }}\n--\n{{ user }} {{ action_human }}\n{{ body }}",
        )
        .unwrap();

        let templates = Templates::load_dir(dir.path()).unwrap();
        assert_eq!(templates.for_kind(EventKind::Thread).name(), "thread-action");
        assert_eq!(templates.for_kind(EventKind::Comment).kind(), EventKind::Comment);
        let out = templates.comment.render(&ctx()).unwrap();
        assert_eq!(out.subject, "Re: Q");
        assert_eq!(out.body, "alice added a comment to the discussion:\nhi");
    }

    #[test]
    fn test_load_dir_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Templates::load_dir(dir.path()),
            Err(TemplateError::Io { .. })
        ));
    }

    #[test]
    fn test_shipped_templates_compile() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../templates");
        let templates = Templates::load_dir(dir).unwrap();
        let out = templates.thread.render(&ctx()).unwrap();
        assert_eq!(out.subject, "[GitHub] [repo1] alice created discussion: Q");
        assert!(out.body.ends_with("list-unsubscribe@example.org"));
    }
}
