//! `renderPrompt` (spec.md §4.5). Templates are authored with a small
//! handlebars-like conditional syntax (`{{#if X}}…{{X}}…{{/if}}`); this
//! module translates that into native Jinja control flow
//! (`{% if X %}…{{ X }}…{% endif %}`) and renders the result with
//! `minijinja`, whose default `Undefined` is falsy, so a variable that was
//! never supplied (no sender/type priority matched, no focus set) silently
//! strips its conditional block rather than erroring.

use entity::sea_orm_active_enums::{LlmFocus, Priority};
use lib_mail::CanonicalMessage;
use minijinja::{context, Environment};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::AppResult;

static IF_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{\s*#if\s+(\w+)\s*\}\}").unwrap());

fn to_jinja_syntax(template: &str) -> String {
    let with_if = IF_OPEN.replace_all(template, "{% if $1 %}");
    with_if.replace("{{/if}}", "{% endif %}")
}

pub struct RenderInputs<'a> {
    pub sender_priority: Option<Priority>,
    pub type_priority: Option<Priority>,
    pub llm_focus: Option<&'a LlmFocus>,
}

pub fn render_prompt(
    template: &str,
    email: &CanonicalMessage,
    inputs: &RenderInputs,
) -> AppResult<String> {
    let body_text = email
        .body_text
        .as_deref()
        .or(email.body_html.as_deref())
        .unwrap_or_default();

    let mut env = Environment::new();
    let jinja_source = to_jinja_syntax(template);
    env.add_template("prompt", &jinja_source)
        .map_err(|e| anyhow::anyhow!("invalid prompt template: {e}"))?;
    let tmpl = env.get_template("prompt").unwrap();

    let sender_priorities = inputs
        .sender_priority
        .map(|p| serde_json::to_value(p).unwrap_or_default());
    let email_type_priorities = inputs
        .type_priority
        .map(|p| serde_json::to_value(p).unwrap_or_default());
    let llm_focus = inputs
        .llm_focus
        .map(|f| serde_json::to_value(f).unwrap_or_default());

    let rendered = tmpl
        .render(context! {
            subject => email.subject.clone().unwrap_or_default(),
            fromAddress => email.from.clone(),
            bodyText => body_text,
            receivedAt => email.date.to_rfc3339(),
            senderPriorities => sender_priorities,
            emailTypePriorities => email_type_priorities,
            llmFocus => llm_focus,
        })
        .map_err(|e| anyhow::anyhow!("prompt render failed: {e}"))?;

    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message() -> CanonicalMessage {
        CanonicalMessage {
            uid: 1,
            message_id: "m1".into(),
            subject: Some("Hello".into()),
            from: "a@b.com".into(),
            to: vec![],
            cc: vec![],
            bcc: vec![],
            date: Utc::now(),
            body_text: Some("Body here".into()),
            body_html: None,
            flags: vec![],
        }
    }

    #[test]
    fn substitutes_basic_variables() {
        let tmpl = "Subject: {{subject}}\nFrom: {{fromAddress}}\n{{bodyText}}";
        let inputs = RenderInputs {
            sender_priority: None,
            type_priority: None,
            llm_focus: None,
        };
        let rendered = render_prompt(tmpl, &message(), &inputs).unwrap();
        assert!(rendered.contains("Subject: Hello"));
        assert!(rendered.contains("From: a@b.com"));
        assert!(rendered.contains("Body here"));
    }

    #[test]
    fn strips_unset_conditional_block() {
        let tmpl = "base{{#if senderPriorities}} priority={{senderPriorities}}{{/if}}";
        let inputs = RenderInputs {
            sender_priority: None,
            type_priority: None,
            llm_focus: None,
        };
        let rendered = render_prompt(tmpl, &message(), &inputs).unwrap();
        assert_eq!(rendered, "base");
    }

    #[test]
    fn keeps_set_conditional_block() {
        let tmpl = "base{{#if senderPriorities}} priority={{senderPriorities}}{{/if}}";
        let inputs = RenderInputs {
            sender_priority: Some(Priority::Urgent),
            type_priority: None,
            llm_focus: None,
        };
        let rendered = render_prompt(tmpl, &message(), &inputs).unwrap();
        assert!(rendered.contains("priority=URGENT"));
    }
}
