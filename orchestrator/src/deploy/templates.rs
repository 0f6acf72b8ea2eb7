//! Stack templates
//!
//! Placeholders are `{{UPPER_SNAKE}}` names: `{{NETWORK_NAME}}` plus one per
//! deployment parameter. Docker's own Go templates (`{{.Service.Name}}`)
//! start with a dot and pass through untouched.

use crate::catalog::params::StackParams;
use crate::catalog::StackId;
use crate::errors::OrchestratorError;

pub fn template(stack: StackId) -> &'static str {
    match stack {
        StackId::Traefik => include_str!("../../stacks/traefik.yml"),
        StackId::Portainer => include_str!("../../stacks/portainer.yml"),
        StackId::Redis => include_str!("../../stacks/redis.yml"),
        StackId::Postgres => include_str!("../../stacks/postgres.yml"),
        StackId::Rabbitmq => include_str!("../../stacks/rabbitmq.yml"),
        StackId::Minio => include_str!("../../stacks/minio.yml"),
        StackId::Baserow => include_str!("../../stacks/baserow.yml"),
        StackId::N8nEditor => include_str!("../../stacks/n8n_editor.yml"),
        StackId::N8nWebhook => include_str!("../../stacks/n8n_webhook.yml"),
        StackId::N8nWorker => include_str!("../../stacks/n8n_worker.yml"),
        StackId::ChatwootAdmin => include_str!("../../stacks/chatwoot_admin.yml"),
        StackId::ChatwootSidekiq => include_str!("../../stacks/chatwoot_sidekiq.yml"),
    }
}

/// Substitute every placeholder of `stack`'s template
///
/// Substitution is a single pass over the template, so values are never
/// scanned for placeholders. A list item that receives a value is written
/// as a double-quoted scalar.
pub fn render(
    stack: StackId,
    params: &StackParams,
    network_name: &str,
) -> Result<String, OrchestratorError> {
    let source = template(stack);
    let mut rendered = String::with_capacity(source.len());
    for line in source.split_inclusive('\n') {
        let (body, newline) = match line.strip_suffix('\n') {
            Some(body) => (body, "\n"),
            None => (line, ""),
        };
        rendered.push_str(&render_line(stack, body, params, network_name)?);
        rendered.push_str(newline);
    }
    Ok(rendered)
}

fn render_line(
    stack: StackId,
    line: &str,
    params: &StackParams,
    network_name: &str,
) -> Result<String, OrchestratorError> {
    let mut out = String::with_capacity(line.len());
    let mut substituted = false;
    let mut rest = line;

    while let Some(start) = rest.find("{{") {
        let tail = &rest[start + 2..];
        let Some(end) = tail.find("}}") else {
            break;
        };
        let name = &tail[..end];
        out.push_str(&rest[..start]);
        if is_placeholder(name) {
            let value = if name == "NETWORK_NAME" {
                Some(network_name)
            } else {
                params.get(&name.to_ascii_lowercase())
            };
            let value = value.ok_or_else(|| {
                OrchestratorError::TemplateError(format!(
                    "stack {} has no value for {{{{{}}}}}",
                    stack, name
                ))
            })?;
            out.push_str(value);
            substituted = true;
        } else {
            out.push_str(&rest[start..start + end + 4]);
        }
        rest = &tail[end + 2..];
    }
    out.push_str(rest);

    let item = line.trim_start();
    if !substituted || !item.starts_with("- ") {
        return Ok(out);
    }
    let prefix = line.len() - item.len() + 2;
    let quoted = serde_json::to_string(&out[prefix..])?;
    Ok(format!("{}{}", &out[..prefix], quoted))
}

/// `{{UPPER_SNAKE}}`; Docker's `{{.Field}}` templates do not match
fn is_placeholder(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
