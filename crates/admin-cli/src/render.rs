//! Plain-text rendering for the terminal.

use chrono::{DateTime, Local, Utc};
use shared::store::ListState;
use shared::{
    DashboardStats, FieldErrors, FolderCounts, MessageDetail, MessageView, ProductView,
    QuoteCounts, QuoteView, SettingsView, TemplateView,
};

fn when(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Cuts `text` to `width` characters on a char boundary.
pub fn clip(text: &str, width: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() <= width {
        return line.to_string();
    }
    let mut clipped: String = line.chars().take(width.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}

fn footer<T>(list: &ListState<T>) {
    println!(
        "\x1b[90mPage {} of {} ({} total)\x1b[0m",
        list.page,
        list.total_pages.max(1),
        list.total
    );
}

pub fn messages(list: &ListState<MessageView>) {
    if list.items.is_empty() {
        println!("No messages");
        return;
    }
    println!(
        "{:<36}  {:<10}  {:<24}  {:<32}  {}",
        "ID", "STATUS", "FROM / TO", "SUBJECT", "DATE"
    );
    for m in &list.items {
        let status = if m.is_draft { "DRAFT".to_string() } else { m.status.to_string() };
        let at = m.scheduled_for.or(m.sent_at).unwrap_or(m.created_at);
        println!(
            "{:<36}  {:<10}  {:<24}  {:<32}  {}{}",
            m.id,
            status,
            clip(&m.email, 24),
            clip(&m.subject, 32),
            when(at),
            if m.attachments.is_empty() { "" } else { "  📎" },
        );
    }
    footer(list);
}

pub fn message_detail(detail: &MessageDetail) {
    let m = &detail.message;
    println!("\x1b[1m{}\x1b[0m", m.subject);
    println!("From/To: {} <{}>", m.name, m.email);
    println!("Status:  {}{}", m.status, if m.is_draft { " (draft)" } else { "" });
    println!("Created: {}", when(m.created_at));
    if let Some(at) = m.scheduled_for {
        println!("Sends:   {}", when(at));
    }
    if let Some(at) = m.sent_at {
        println!("Sent:    {}", when(at));
    }
    for a in &m.attachments {
        println!("📎 {} ({} bytes) {}", a.filename, a.file_size, a.file_url);
    }
    println!();
    println!("{}", m.body);
    if !detail.thread.is_empty() {
        println!();
        println!("\x1b[90m── Thread ({} more) ──\x1b[0m", detail.thread.len());
        for t in &detail.thread {
            println!("{}  {:<10}  {}  {}", when(t.created_at), t.status, t.email, clip(&t.subject, 40));
        }
    }
}

pub fn folder_counts(counts: &FolderCounts) {
    println!("inbox      {:>5}  ({} unread)", counts.inbox, counts.unread);
    println!("sent       {:>5}", counts.sent);
    println!("drafts     {:>5}", counts.drafts);
    println!("scheduled  {:>5}", counts.scheduled);
    println!("archived   {:>5}", counts.archived);
    println!("trash      {:>5}", counts.trash);
}

pub fn quotes(list: &ListState<QuoteView>) {
    if list.items.is_empty() {
        println!("No quotes");
        return;
    }
    println!(
        "{:<36}  {:<10}  {:<20}  {:<24}  {:<20}  {}",
        "ID", "STATUS", "NAME", "EMAIL", "PRODUCT", "DATE"
    );
    for q in &list.items {
        println!(
            "{:<36}  {:<10}  {:<20}  {:<24}  {:<20}  {}",
            q.id,
            q.status,
            clip(&q.name, 20),
            clip(&q.email, 24),
            clip(q.product_interest.as_deref().unwrap_or("-"), 20),
            when(q.created_at),
        );
    }
    footer(list);
}

pub fn quote_detail(q: &QuoteView) {
    println!("\x1b[1mQuote from {}\x1b[0m  [{}]", q.name, q.status);
    println!("Email:    {}", q.email);
    println!("Phone:    {}", q.phone);
    if let Some(company) = &q.company {
        println!("Company:  {}", company);
    }
    if let Some(product) = &q.product_interest {
        println!("Product:  {}", product);
    }
    if let Some(quantity) = &q.quantity {
        println!("Quantity: {}", quantity);
    }
    println!("Received: {}", when(q.created_at));
    if let Some(message) = &q.message {
        println!();
        println!("{}", message);
    }
    for r in &q.replies {
        println!();
        println!("\x1b[90m── Reply {} ──\x1b[0m", when(r.created_at));
        println!("{}", r.subject);
        println!("{}", r.body);
    }
}

pub fn quote_counts(counts: &QuoteCounts) {
    println!("all        {:>5}", counts.all);
    println!("unread     {:>5}", counts.unread);
    println!("read       {:>5}", counts.read);
    println!("pending    {:>5}", counts.pending);
    println!("processed  {:>5}", counts.processed);
    println!("responded  {:>5}", counts.responded);
    println!("archived   {:>5}", counts.archived);
    println!("trash      {:>5}", counts.trash);
}

pub fn products(list: &ListState<ProductView>) {
    if list.items.is_empty() {
        println!("No products");
        return;
    }
    println!(
        "{:<36}  {:<28}  {:<8}  {:<16}  {:>10}",
        "ID", "NAME", "TYPE", "CATEGORY", "PRICE"
    );
    for p in &list.items {
        println!(
            "{:<36}  {:<28}  {:<8}  {:<16}  {:>10.2}",
            p.id,
            clip(&p.name, 28),
            p.product_type,
            clip(&p.category, 16),
            p.price,
        );
    }
    footer(list);
}

pub fn templates(templates: &[TemplateView]) {
    if templates.is_empty() {
        println!("No reply templates");
        return;
    }
    for t in templates {
        println!(
            "{:<36}  {}{}  {}",
            t.id,
            t.name,
            if t.is_default { " (default)" } else { "" },
            clip(&t.subject, 40),
        );
    }
}

pub fn settings(s: &SettingsView) {
    let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    let flag = |b: bool| if b { "on" } else { "off" };
    println!("company_name             {}", s.company_name);
    println!("company_email            {}", s.company_email);
    println!("company_phone            {}", s.company_phone);
    println!("company_address          {}", s.company_address);
    println!("logo_url                 {}", opt(&s.logo_url));
    println!("smtp_host                {}", opt(&s.smtp_host));
    println!(
        "smtp_port                {}",
        s.smtp_port.map(|p| p.to_string()).unwrap_or_else(|| "-".into())
    );
    println!("smtp_username            {}", opt(&s.smtp_username));
    println!("smtp_password            {}", if s.has_smtp_password { "****" } else { "-" });
    println!("smtp_from_email          {}", opt(&s.smtp_from_email));
    println!("email_notifications      {}", flag(s.email_notifications));
    println!("quote_notifications      {}", flag(s.quote_notifications));
    println!("message_notifications    {}", flag(s.message_notifications));
    println!("product_notifications    {}", flag(s.product_notifications));
    println!("notification_email       {}", opt(&s.notification_email));
    println!("cloud_name               {}", opt(&s.cloud_name));
    println!("cloud_api_key            {}", opt(&s.cloud_api_key));
    println!("cloud_api_secret         {}", if s.has_cloud_api_secret { "****" } else { "-" });
    println!(
        "session_timeout_minutes  {}",
        s.session_timeout_minutes
            .map(|m| m.to_string())
            .unwrap_or_else(|| "-".into())
    );
}

pub fn dashboard(stats: &DashboardStats) {
    println!("Unread messages     {:>5}", stats.unread_messages);
    println!("Unread quotes       {:>5}", stats.unread_quotes);
    println!("Scheduled messages  {:>5}", stats.scheduled_messages);
    println!("Products            {:>5}", stats.products);
}

pub fn field_errors(errors: &FieldErrors) {
    for (field, messages) in errors.iter() {
        for message in messages {
            eprintln!("  \x1b[31m{}\x1b[0m: {}", field, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("Frozen lamb shoulder", 10), "Frozen la…");
        assert_eq!(clip("first line\nsecond", 20), "first line");
        assert_eq!(clip("Rindfleisch für Dubai", 12).chars().count(), 12);
    }
}
