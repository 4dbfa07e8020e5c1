use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde_json::{Map, Value};
use shared::{Data, NoData, SettingsUpdate, SettingsView, TemplateInput, TemplateView};

use super::{announce, read_body};
use crate::{client::ApiClient, render};

const SETTINGS_KEYS: &[&str] = &[
    "company_name",
    "company_email",
    "company_phone",
    "company_address",
    "logo_url",
    "smtp_host",
    "smtp_port",
    "smtp_username",
    "smtp_password",
    "smtp_from_email",
    "email_notifications",
    "quote_notifications",
    "message_notifications",
    "product_notifications",
    "notification_email",
    "cloud_name",
    "cloud_api_key",
    "cloud_api_secret",
    "session_timeout_minutes",
];

#[derive(Subcommand)]
pub enum SettingsCommand {
    /// Show your settings
    Show,
    /// Change settings, e.g. `set company_name "Prime Cuts" quote_notifications off`
    Set {
        /// Alternating keys and values; an empty value clears an optional field
        #[arg(required = true, num_args = 2..)]
        pairs: Vec<String>,
    },
    /// Send a test email through your mail settings
    TestEmail,
}

#[derive(Subcommand)]
pub enum TemplatesCommand {
    /// List reply templates
    List,
    /// Add a reply template
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        subject: String,
        #[arg(long, conflicts_with = "body_file")]
        body: Option<String>,
        #[arg(long)]
        body_file: Option<std::path::PathBuf>,
        #[arg(long)]
        default: bool,
    },
    /// Make a template the default for quote replies
    Default { id: String },
    /// Delete a template
    Delete { id: String },
}

fn parse_value(key: &str, raw: &str) -> Result<Value> {
    Ok(match key {
        "smtp_port" | "session_timeout_minutes" => {
            Value::from(raw.parse::<i64>().with_context(|| format!("{} must be a number", key))?)
        }
        k if k.ends_with("_notifications") => Value::Bool(match raw.to_ascii_lowercase().as_str() {
            "on" | "true" | "yes" | "1" => true,
            "off" | "false" | "no" | "0" => false,
            _ => bail!("{} must be on or off", key),
        }),
        _ => Value::String(raw.to_string()),
    })
}

/// Builds a partial update from alternating `key value` arguments.
pub fn settings_update(pairs: &[String]) -> Result<SettingsUpdate> {
    if pairs.len() % 2 != 0 {
        bail!("Every key needs a value");
    }
    let mut fields = Map::new();
    for pair in pairs.chunks(2) {
        let key = pair[0].as_str();
        if !SETTINGS_KEYS.contains(&key) {
            bail!("Unknown setting: {}. Valid keys: {}", key, SETTINGS_KEYS.join(", "));
        }
        fields.insert(key.to_string(), parse_value(key, &pair[1])?);
    }
    Ok(serde_json::from_value(Value::Object(fields))?)
}

pub async fn run_settings(api: &ApiClient, command: SettingsCommand) -> Result<()> {
    match command {
        SettingsCommand::Show => {
            let settings = api.get::<Data<SettingsView>>("/api/settings").await?.data.data;
            render::settings(&settings);
        }
        SettingsCommand::Set { pairs } => {
            let update = settings_update(&pairs)?;
            let reply = api.put::<Data<SettingsView>, _>("/api/settings", &update).await?;
            announce(reply.message, "Settings saved");
            render::settings(&reply.data.data);
        }
        SettingsCommand::TestEmail => {
            let reply = api.post_empty::<NoData>("/api/settings/test-email").await?;
            announce(reply.message, "Test email sent");
        }
    }
    Ok(())
}

pub async fn run_templates(api: &ApiClient, command: TemplatesCommand) -> Result<()> {
    match command {
        TemplatesCommand::List => {
            let templates = api.get::<Data<Vec<TemplateView>>>("/api/templates").await?.data.data;
            render::templates(&templates);
        }
        TemplatesCommand::Create {
            name,
            subject,
            body,
            body_file,
            default,
        } => {
            let input = TemplateInput {
                name,
                subject,
                body: read_body(body, body_file)?,
                is_default: default,
            };
            let reply = api.post::<Data<TemplateView>, _>("/api/templates", &input).await?;
            announce(reply.message, "Template created");
            println!("{}", reply.data.data.id);
        }
        TemplatesCommand::Default { id } => {
            let reply = api
                .post_empty::<NoData>(&format!("/api/templates/{}/default", id))
                .await?;
            announce(reply.message, "Default template updated");
        }
        TemplatesCommand::Delete { id } => {
            let reply = api.delete::<NoData>(&format!("/api/templates/{}", id)).await?;
            announce(reply.message, "Template deleted");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_settings_update_types_values() {
        let update = settings_update(&args(&[
            "company_name",
            "Prime Cuts",
            "smtp_port",
            "465",
            "quote_notifications",
            "off",
            "logo_url",
            "",
        ]))
        .unwrap();
        assert_eq!(update.company_name.as_deref(), Some("Prime Cuts"));
        assert_eq!(update.smtp_port, Some(465));
        assert_eq!(update.quote_notifications, Some(false));
        assert_eq!(update.logo_url.as_deref(), Some(""));
        assert!(update.smtp_password.is_none());
    }

    #[test]
    fn test_settings_update_rejects_bad_input() {
        assert!(settings_update(&args(&["favourite_colour", "red"])).is_err());
        assert!(settings_update(&args(&["smtp_port", "twenty"])).is_err());
        assert!(settings_update(&args(&["email_notifications", "maybe"])).is_err());
        assert!(settings_update(&args(&["company_name"])).is_err());
    }
}
