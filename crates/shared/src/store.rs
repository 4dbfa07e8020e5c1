//! Client-side list state for the admin screens.
//!
//! Lists are cached per `(view, filters)` key. Mutations are applied
//! optimistically through pure reducers; the store hands back a snapshot of
//! the list as it was immediately before, and rolling back restores exactly
//! that snapshot.

use std::collections::HashMap;

use serde::Serialize;

use crate::message::{resolve_target, settles_as_draft};
use crate::{Folder, MessageStatus, MessageView, Page, ProductView, QuoteStatus, QuoteView};

/// Anything listed by id.
pub trait Keyed {
    fn id(&self) -> &str;
}

impl Keyed for MessageView {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Keyed for QuoteView {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Keyed for ProductView {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    view: String,
    filters: String,
}

impl StoreKey {
    /// Filters are canonicalised through their JSON form.
    pub fn new(view: impl Into<String>, filters: &impl Serialize) -> Self {
        Self {
            view: view.into(),
            filters: serde_json::to_string(filters).unwrap_or_default(),
        }
    }

    pub fn view(&self) -> &str {
        &self.view
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListState<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub total_pages: u32,
    pub loading: bool,
}

impl<T> Default for ListState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page: 1,
            total_pages: 0,
            loading: false,
        }
    }
}

impl<T> From<Page<T>> for ListState<T> {
    fn from(page: Page<T>) -> Self {
        Self {
            items: page.items,
            total: page.total,
            page: page.page,
            total_pages: page.total_pages,
            loading: false,
        }
    }
}

/// The list exactly as it was before an optimistic mutation.
#[derive(Debug, Clone)]
#[must_use = "a snapshot is needed to roll back a failed mutation"]
pub struct Snapshot<T> {
    key: StoreKey,
    state: ListState<T>,
}

#[derive(Debug)]
pub struct ListStore<T> {
    lists: HashMap<StoreKey, ListState<T>>,
}

impl<T> Default for ListStore<T> {
    fn default() -> Self {
        Self {
            lists: HashMap::new(),
        }
    }
}

impl<T: Keyed + Clone> ListStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &StoreKey) -> Option<&ListState<T>> {
        self.lists.get(key)
    }

    /// Marks a list as loading. Returns false when a load is already in
    /// flight for that key, so the same affordance cannot submit twice.
    pub fn begin_loading(&mut self, key: &StoreKey) -> bool {
        let state = self.lists.entry(key.clone()).or_default();
        if state.loading {
            return false;
        }
        state.loading = true;
        true
    }

    pub fn finish_loading(&mut self, key: &StoreKey) {
        if let Some(state) = self.lists.get_mut(key) {
            state.loading = false;
        }
    }

    pub fn load(&mut self, key: StoreKey, page: Page<T>) {
        self.lists.insert(key, page.into());
    }

    /// Replaces the list with `reducer(current)` and returns what it was.
    /// Unknown keys are left alone.
    pub fn optimistic<F>(&mut self, key: &StoreKey, reducer: F) -> Option<Snapshot<T>>
    where
        F: FnOnce(&ListState<T>) -> ListState<T>,
    {
        let current = self.lists.get_mut(key)?;
        let next = reducer(current);
        let before = std::mem::replace(current, next);
        Some(Snapshot {
            key: key.clone(),
            state: before,
        })
    }

    pub fn rollback(&mut self, snapshot: Snapshot<T>) {
        self.lists.insert(snapshot.key, snapshot.state);
    }

    pub fn invalidate(&mut self, key: &StoreKey) {
        self.lists.remove(key);
    }

    /// Every mutating action refetches afterwards.
    pub fn invalidate_all(&mut self) {
        self.lists.clear();
    }
}

/// Drops the given ids from the list.
pub fn remove_items<T: Keyed + Clone>(state: &ListState<T>, ids: &[String]) -> ListState<T> {
    let mut next = state.clone();
    next.items.retain(|item| !ids.iter().any(|id| id == item.id()));
    let removed = (state.items.len() - next.items.len()) as u64;
    next.total = next.total.saturating_sub(removed);
    next
}

/// Applies a status change to messages shown in `folder`. Items whose
/// transition is not permitted keep their status; items the folder no
/// longer admits are removed.
pub fn change_message_status(
    state: &ListState<MessageView>,
    folder: Folder,
    ids: &[String],
    target: MessageStatus,
) -> ListState<MessageView> {
    let mut next = state.clone();
    for message in next.items.iter_mut().filter(|m| ids.contains(&m.id)) {
        if let Ok(status) = resolve_target(target, message.status) {
            message.status = status;
            message.is_draft =
                settles_as_draft(message.kind, message.is_draft, message.sent_at.is_some());
            message.scheduled_for = None;
        }
    }
    next.items
        .retain(|m| folder.admits(m.kind, m.status, m.is_draft));
    let removed = (state.items.len() - next.items.len()) as u64;
    next.total = next.total.saturating_sub(removed);
    next
}

/// Quote counterpart of [`change_message_status`] for a list filtered by
/// `filter`.
pub fn change_quote_status(
    state: &ListState<QuoteView>,
    filter: Option<QuoteStatus>,
    ids: &[String],
    target: QuoteStatus,
) -> ListState<QuoteView> {
    let mut next = state.clone();
    for quote in next.items.iter_mut().filter(|q| ids.contains(&q.id)) {
        quote.status = target;
    }
    next.items.retain(|q| q.status.visible_in(filter));
    let removed = (state.items.len() - next.items.len()) as u64;
    next.total = next.total.saturating_sub(removed);
    next
}

/// Detail view of one record. Opening an unread record requests exactly
/// one read transition per mount, however often the view re-renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailView {
    id: String,
    read_requested: bool,
}

impl DetailView {
    pub fn mount(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            read_requested: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the id to mark as read on the first render that sees the
    /// record unread, `None` on every other render.
    pub fn on_render(&mut self, is_unread: bool) -> Option<&str> {
        if is_unread && !self.read_requested {
            self.read_requested = true;
            Some(&self.id)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MessageListQuery, MessageType};
    use chrono::Utc;

    fn message(id: &str, status: MessageStatus) -> MessageView {
        MessageView {
            id: id.to_string(),
            name: "Buyer".into(),
            email: "buyer@example.com".into(),
            subject: "Ribeye pricing".into(),
            body: "How much per kg?".into(),
            kind: MessageType::Inbound,
            status,
            is_draft: false,
            scheduled_for: None,
            sent_at: None,
            thread_id: None,
            parent_message_id: None,
            user_id: None,
            created_at: Utc::now(),
            attachments: vec![],
        }
    }

    fn inbox() -> (ListStore<MessageView>, StoreKey) {
        let mut store = ListStore::new();
        let key = StoreKey::new("messages", &MessageListQuery::default());
        store.load(
            key.clone(),
            Page::new(
                vec![
                    message("a", MessageStatus::Unread),
                    message("b", MessageStatus::Read),
                    message("c", MessageStatus::Unread),
                ],
                13,
                1,
                10,
            ),
        );
        (store, key)
    }

    #[test]
    fn test_archive_removes_from_inbox_and_rollback_restores() {
        let (mut store, key) = inbox();
        let before = store.get(&key).cloned().unwrap();

        let ids = vec!["a".to_string(), "c".to_string()];
        let snapshot = store
            .optimistic(&key, |s| {
                change_message_status(s, Folder::Inbox, &ids, MessageStatus::Archived)
            })
            .unwrap();

        let after = store.get(&key).unwrap();
        assert_eq!(after.items.len(), 1);
        assert_eq!(after.items[0].id, "b");
        assert_eq!(after.total, 11);

        store.rollback(snapshot);
        assert_eq!(store.get(&key), Some(&before));
    }

    #[test]
    fn test_mark_read_updates_in_place() {
        let (mut store, key) = inbox();
        let ids = vec!["a".to_string(), "b".to_string()];
        let _snapshot = store.optimistic(&key, |s| {
            change_message_status(s, Folder::Inbox, &ids, MessageStatus::Read)
        });

        let after = store.get(&key).unwrap();
        assert_eq!(after.items.len(), 3);
        assert_eq!(after.items[0].status, MessageStatus::Read);
        assert_eq!(after.items[1].status, MessageStatus::Read);
        assert_eq!(after.items[2].status, MessageStatus::Unread);
        assert_eq!(after.total, 13);
    }

    #[test]
    fn test_trash_view_restore_leaves_trash() {
        let state = ListState {
            items: vec![message("t", MessageStatus::Trash)],
            total: 1,
            ..ListState::default()
        };
        let next = change_message_status(&state, Folder::Trash, &["t".to_string()], MessageStatus::Read);
        assert!(next.items.is_empty());
        assert_eq!(next.total, 0);
    }

    #[test]
    fn test_optimistic_on_unknown_key_is_noop() {
        let mut store: ListStore<MessageView> = ListStore::new();
        let key = StoreKey::new("messages", &"missing");
        assert!(store.optimistic(&key, |s| s.clone()).is_none());
        assert!(store.get(&key).is_none());
    }

    #[test]
    fn test_keys_differ_by_filters() {
        let inbox = StoreKey::new("messages", &MessageListQuery::default());
        let trash = StoreKey::new(
            "messages",
            &MessageListQuery {
                status: Folder::Trash,
                ..MessageListQuery::default()
            },
        );
        assert_ne!(inbox, trash);
        assert_eq!(inbox.view(), "messages");
    }

    #[test]
    fn test_loading_guard_blocks_duplicate_submission() {
        let (mut store, key) = inbox();
        assert!(store.begin_loading(&key));
        assert!(!store.begin_loading(&key));
        store.finish_loading(&key);
        assert!(store.begin_loading(&key));
    }

    #[test]
    fn test_remove_items() {
        let (store, key) = inbox();
        let next = remove_items(store.get(&key).unwrap(), &["b".to_string()]);
        assert_eq!(next.items.len(), 2);
        assert_eq!(next.total, 12);
    }

    #[test]
    fn test_invalidate_all() {
        let (mut store, key) = inbox();
        store.invalidate_all();
        assert!(store.get(&key).is_none());
    }

    #[test]
    fn test_read_requested_once_per_mount() {
        let mut view = DetailView::mount("q1");
        let mut requests = 0;
        for _ in 0..5 {
            if view.on_render(true).is_some() {
                requests += 1;
            }
        }
        assert_eq!(requests, 1);

        let mut read = DetailView::mount("q2");
        assert_eq!(read.on_render(false), None);

        let mut remounted = DetailView::mount("q1");
        assert_eq!(remounted.on_render(true), Some("q1"));
    }
}
