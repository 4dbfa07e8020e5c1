//! CSV renderings of message and quote listings.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::db::{Message, Quote};

pub const MESSAGE_HEADER: [&str; 7] = ["Name", "Email", "Subject", "Message", "Status", "Type", "Date"];

pub const QUOTE_HEADER: [&str; 9] = [
    "Name",
    "Email",
    "Phone",
    "Company",
    "Product Interest",
    "Quantity",
    "Message",
    "Status",
    "Date",
];

fn date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("csv flush failed: {}", e.error()))?;
    Ok(String::from_utf8(bytes)?)
}

pub fn messages_csv(messages: &[Message]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(MESSAGE_HEADER)?;
    for m in messages {
        writer.write_record([
            m.name.as_str(),
            m.email.as_str(),
            m.subject.as_str(),
            m.body.as_str(),
            m.status.as_str(),
            m.kind.as_str(),
            date(m.created_at).as_str(),
        ])?;
    }
    finish(writer)
}

pub fn quotes_csv(quotes: &[Quote]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(QUOTE_HEADER)?;
    for q in quotes {
        writer.write_record([
            q.name.as_str(),
            q.email.as_str(),
            q.phone.as_str(),
            q.company.as_deref().unwrap_or(""),
            q.product_interest.as_deref().unwrap_or(""),
            q.quantity.as_deref().unwrap_or(""),
            q.message.as_deref().unwrap_or(""),
            q.status.as_str(),
            date(q.created_at).as_str(),
        ])?;
    }
    finish(writer)
}

/// File name for an export taken now, e.g. `messages-2024-05-01.csv`.
pub fn file_name(kind: &str) -> String {
    format!("{}-{}.csv", kind, Utc::now().format("%Y-%m-%d"))
}
