use axum::{extract::State, response::IntoResponse};
use shared::{
    Ack, ActionResponse, Affected, BulkStatusUpdate, Data, Page, QuoteCounts, QuoteListQuery,
    QuoteReplyRequest, QuoteStatus, QuoteView, StatusUpdate,
};

use super::extract::{Json, Path, Query};
use super::{auth::AdminUser, messages::csv_response};
use crate::{
    db::{Quote, QuoteFilter},
    error::AppError,
    export,
    mailer::OutgoingMail,
    state::AppState,
    validation::validate_quote_reply,
};

const DEFAULT_REPLY_SUBJECT: &str = "Re: Your quote request";

fn parse_status(raw: &str) -> Result<QuoteStatus, AppError> {
    raw.parse::<QuoteStatus>()
        .map_err(|e| AppError::BadRequest(e.to_string()))
}

impl TryFrom<QuoteListQuery> for QuoteFilter {
    type Error = AppError;

    fn try_from(query: QuoteListQuery) -> Result<Self, Self::Error> {
        let status = match query.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) if s.eq_ignore_ascii_case("all") => None,
            Some(s) => Some(parse_status(s)?),
        };
        Ok(QuoteFilter {
            page: query.page,
            limit: query.limit,
            status,
            sort_by: query.sort_by,
            search: query.search,
            date_from: query.date_from,
            date_to: query.date_to,
        })
    }
}

async fn find(state: &AppState, id: &str) -> Result<Quote, AppError> {
    state
        .db
        .get_quote(id)
        .await?
        .ok_or(AppError::NotFound("Quote"))
}

async fn detail(state: &AppState, quote: Quote) -> Result<QuoteView, AppError> {
    let replies = state.db.get_quote_replies(&quote.id).await?;
    Ok(quote.into_view(replies))
}

pub async fn list_quotes(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<QuoteListQuery>,
) -> Result<Json<ActionResponse<Page<QuoteView>>>, AppError> {
    let filter = QuoteFilter::try_from(query)?;
    let (quotes, total) = state.db.get_quotes(&filter).await?;
    let items = quotes.into_iter().map(|q| q.into_view(Vec::new())).collect();
    let (page, limit, _) = crate::db::page_window(filter.page, filter.limit);
    Ok(Json(ActionResponse::ok(Page::new(items, total, page, limit))))
}

pub async fn counts(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<ActionResponse<QuoteCounts>>, AppError> {
    Ok(Json(ActionResponse::ok(state.db.quote_status_counts().await?)))
}

pub async fn get_quote(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse<Data<QuoteView>>>, AppError> {
    let quote = find(&state, &id).await?;
    Ok(Json(ActionResponse::ok(Data {
        data: detail(&state, quote).await?,
    })))
}

pub async fn update_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(req): Json<StatusUpdate>,
) -> Result<Json<ActionResponse<Data<QuoteView>>>, AppError> {
    let status = parse_status(&req.status)?;
    if !state.db.set_quote_status(&id, status).await? {
        return Err(AppError::NotFound("Quote"));
    }
    tracing::info!("Quote {} -> {}", id, status);
    let quote = find(&state, &id).await?;
    Ok(Json(ActionResponse::ok_with(
        "Quote updated",
        Data {
            data: detail(&state, quote).await?,
        },
    )))
}

pub async fn bulk_update_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<BulkStatusUpdate>,
) -> Result<Json<ActionResponse<Affected>>, AppError> {
    let status = parse_status(&req.status)?;
    let affected = state.db.update_quote_status_many(&req.ids, status).await?;
    tracing::info!("Moved {} quotes to {}", affected, status);
    Ok(Json(ActionResponse::ok_with(
        format!("{} quotes updated", affected),
        Affected { affected },
    )))
}

/// Emails the customer, then records the reply and marks the quote
/// RESPONDED. Nothing is recorded when the email cannot be sent.
pub async fn reply(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
    Json(req): Json<QuoteReplyRequest>,
) -> Result<Json<ActionResponse<Data<QuoteView>>>, AppError> {
    let quote = find(&state, &id).await?;

    let template = match (&req.body, &req.template_id) {
        (Some(_), _) => None,
        (None, Some(template_id)) => Some(
            state
                .db
                .get_template(template_id)
                .await?
                .ok_or(AppError::NotFound("Template"))?,
        ),
        (None, None) => state.db.get_default_template().await?,
    };
    let subject = req
        .subject
        .filter(|s| !s.trim().is_empty())
        .or_else(|| {
            template
                .as_ref()
                .map(|t| t.subject.clone())
                .filter(|s| !s.trim().is_empty())
        })
        .unwrap_or_else(|| DEFAULT_REPLY_SUBJECT.to_string());
    let body = req
        .body
        .or_else(|| template.map(|t| t.body))
        .unwrap_or_default();
    validate_quote_reply(&subject, &body)?;

    let mut mail = OutgoingMail::new(quote.email.clone(), subject.clone(), body.clone());
    mail.to_name = Some(quote.name.clone());
    let account = state.smtp_account_for(Some(admin.id())).await?;
    state.mailer.send(&mail, account.as_ref()).await?;

    state
        .db
        .reply_to_quote(&quote.id, admin.id(), &subject, &body)
        .await?;
    tracing::info!("Replied to quote {}", quote.id);

    let quote = find(&state, &id).await?;
    Ok(Json(ActionResponse::ok_with(
        "Reply sent",
        Data {
            data: detail(&state, quote).await?,
        },
    )))
}

pub async fn delete_quote(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<Ack>, AppError> {
    if !state.db.delete_quote(&id).await? {
        return Err(AppError::NotFound("Quote"));
    }
    tracing::info!("Deleted quote {}", id);
    Ok(Json(Ack::done("Quote deleted")))
}

pub async fn empty_trash(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<ActionResponse<Affected>>, AppError> {
    let affected = state.db.delete_quotes_by_status(QuoteStatus::Trash).await?;
    tracing::info!("Emptied quote trash: {} quotes", affected);
    Ok(Json(ActionResponse::ok_with(
        "Trash emptied",
        Affected { affected },
    )))
}

pub async fn export_quotes(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<QuoteListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = QuoteFilter::try_from(query)?;
    let quotes = state.db.export_quotes(&filter).await?;
    let csv = export::quotes_csv(&quotes)?;
    Ok(csv_response(csv, "quotes"))
}
