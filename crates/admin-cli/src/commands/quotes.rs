use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use shared::store::{change_quote_status, remove_items, DetailView};
use shared::{
    Affected, BulkStatusUpdate, Data, NoData, QuoteCounts, QuoteListQuery, QuoteReplyRequest,
    QuoteStatus, QuoteView, SortOrder, StatusUpdate,
};

use super::{announce, read_body, write_export};
use crate::{client::ApiClient, render, screen::Screen};

#[derive(Subcommand)]
pub enum QuotesCommand {
    /// List quote requests
    List {
        #[command(flatten)]
        filter: QuoteFilter,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Show how many quotes each status holds
    Counts,
    /// Show a quote and its replies; an unread quote is marked read
    Show { id: String },
    /// Move quotes to another status
    Status {
        status: QuoteStatus,
        #[arg(required = true)]
        ids: Vec<String>,
        /// Status the list is filtered by
        #[arg(long)]
        filter: Option<QuoteStatus>,
    },
    /// Email the customer and mark the quote RESPONDED
    Reply {
        id: String,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long, conflicts_with = "body_file")]
        body: Option<String>,
        #[arg(long)]
        body_file: Option<PathBuf>,
        /// Use this reply template's body (the default template when no
        /// body is given)
        #[arg(long, conflicts_with_all = ["body", "body_file"])]
        template: Option<String>,
    },
    /// Delete a quote permanently
    Delete { id: String },
    /// Permanently delete every quote in the trash
    EmptyTrash,
    /// Export quotes as CSV
    Export {
        #[command(flatten)]
        filter: QuoteFilter,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct QuoteFilter {
    #[arg(long)]
    status: Option<QuoteStatus>,
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    oldest: bool,
}

impl QuoteFilter {
    fn query(&self, page: u32) -> QuoteListQuery {
        QuoteListQuery {
            page,
            limit: shared::DEFAULT_PAGE_SIZE,
            status: self.status.map(|s| s.to_string()),
            sort_by: if self.oldest { SortOrder::Oldest } else { SortOrder::Newest },
            search: self.search.clone(),
            ..QuoteListQuery::default()
        }
    }
}

fn filtered_screen(filter: Option<QuoteStatus>) -> (Screen<QuoteView>, QuoteListQuery) {
    let query = QuoteListQuery {
        page: 1,
        limit: shared::DEFAULT_PAGE_SIZE,
        status: filter.map(|s| s.to_string()),
        ..QuoteListQuery::default()
    };
    (Screen::new("quotes", &query), query)
}

async fn show(api: &ApiClient, id: &str) -> Result<()> {
    let mut view = DetailView::mount(id);
    let mut quote = api.get::<Data<QuoteView>>(&format!("/api/quotes/{}", id)).await?.data.data;

    if let Some(id) = view.on_render(quote.status == QuoteStatus::Unread) {
        let update = StatusUpdate {
            status: QuoteStatus::Read.to_string(),
        };
        match api
            .patch::<Data<QuoteView>, _>(&format!("/api/quotes/{}/status", id), &update)
            .await
        {
            Ok(reply) => quote.status = reply.data.data.status,
            Err(e) => tracing::warn!("Could not mark quote {} read: {}", id, e),
        }
    }
    render::quote_detail(&quote);
    Ok(())
}

async fn change_status(
    api: &ApiClient,
    filter: Option<QuoteStatus>,
    ids: Vec<String>,
    target: QuoteStatus,
) -> Result<()> {
    let (mut screen, query) = filtered_screen(filter);
    screen.refresh(api, "/api/quotes", &query).await?;

    let request = async {
        if let [id] = ids.as_slice() {
            let update = StatusUpdate {
                status: target.to_string(),
            };
            api.patch::<Data<QuoteView>, _>(&format!("/api/quotes/{}/status", id), &update)
                .await
                .map(|reply| reply.message)
        } else {
            let update = BulkStatusUpdate {
                ids: ids.clone(),
                status: target.to_string(),
            };
            api.post::<Affected, _>("/api/quotes/bulk-status", &update)
                .await
                .map(|reply| reply.message)
        }
    };
    let outcome = screen
        .mutate(|list| change_quote_status(list, filter, &ids, target), request)
        .await;

    match outcome {
        Ok(message) => {
            announce(message, "Status updated");
            screen.refresh(api, "/api/quotes", &query).await?;
        }
        Err(e) => {
            eprintln!("\x1b[31m✗ {}\x1b[0m", e);
            eprintln!("\x1b[90mNothing changed.\x1b[0m");
        }
    }
    if let Some(list) = screen.list() {
        render::quotes(list);
    }
    Ok(())
}

pub async fn run(api: &ApiClient, command: QuotesCommand) -> Result<()> {
    match command {
        QuotesCommand::List { filter, page } => {
            let query = filter.query(page);
            let mut screen = Screen::new("quotes", &query);
            screen.refresh(api, "/api/quotes", &query).await?;
            if let Some(list) = screen.list() {
                render::quotes(list);
            }
        }
        QuotesCommand::Counts => {
            let counts = api.get::<QuoteCounts>("/api/quotes/counts").await?.data;
            render::quote_counts(&counts);
        }
        QuotesCommand::Show { id } => show(api, &id).await?,
        QuotesCommand::Status { status, ids, filter } => {
            change_status(api, filter, ids, status).await?
        }
        QuotesCommand::Reply {
            id,
            subject,
            body,
            body_file,
            template,
        } => {
            let body = match (body, body_file) {
                (None, None) => None,
                (body, file) => Some(read_body(body, file)?),
            };
            let request = QuoteReplyRequest {
                subject,
                body,
                template_id: template,
            };
            let reply = api
                .post::<Data<QuoteView>, _>(&format!("/api/quotes/{}/reply", id), &request)
                .await?;
            announce(reply.message, "Reply sent");
            render::quote_detail(&reply.data.data);
        }
        QuotesCommand::Delete { id } => {
            let (mut screen, query) = filtered_screen(Some(QuoteStatus::Trash));
            screen.refresh(api, "/api/quotes", &query).await?;
            let ids = vec![id];
            let reply = screen
                .mutate(
                    |list| remove_items(list, &ids),
                    api.delete::<NoData>(&format!("/api/quotes/{}", ids[0])),
                )
                .await?;
            announce(reply.message, "Quote deleted");
        }
        QuotesCommand::EmptyTrash => {
            let reply = api.delete::<Affected>("/api/quotes/trash").await?;
            announce(reply.message, "Trash emptied");
            println!("{} quotes deleted", reply.data.affected);
        }
        QuotesCommand::Export { filter, out } => {
            let csv = api.download("/api/quotes/export", &filter.query(1)).await?;
            write_export(&csv, out.as_deref())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(subcommand)]
        command: QuotesCommand,
    }

    #[test]
    fn test_status_accepts_lowercase() {
        let parsed = Harness::try_parse_from(["x", "status", "processed", "q1", "q2"]).unwrap();
        let QuotesCommand::Status { status, ids, filter } = parsed.command else {
            panic!("wrong command");
        };
        assert_eq!(status, QuoteStatus::Processed);
        assert_eq!(ids, vec!["q1", "q2"]);
        assert!(filter.is_none());
    }

    #[test]
    fn test_template_conflicts_with_body() {
        let result = Harness::try_parse_from([
            "x", "reply", "q1", "--body", "<p>Hi</p>", "--template", "t1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unfiltered_query_has_no_status() {
        let parsed = Harness::try_parse_from(["x", "list"]).unwrap();
        let QuotesCommand::List { filter, page } = parsed.command else {
            panic!("wrong command");
        };
        let query = filter.query(page);
        assert!(query.status.is_none());
        assert_eq!(query.limit, shared::DEFAULT_PAGE_SIZE);
    }
}
