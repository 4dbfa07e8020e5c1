//! Message lifecycle: statuses, folders and the transitions user actions cause.
//!
//! A folder is not stored anywhere. It is a predicate over
//! `(type, status, is_draft)` and the server's SQL filters must agree with
//! [`Folder::admits`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::UnknownVariant;

symbolic_enum! {
    /// Lifecycle status of a message.
    pub enum MessageStatus {
        Unread => "UNREAD",
        Read => "READ",
        Archived => "ARCHIVED",
        Trash => "TRASH",
        Scheduled => "SCHEDULED",
        Sent => "SENT",
    }
}

symbolic_enum! {
    /// Direction of a message relative to the company.
    pub enum MessageType {
        Inbound => "INBOUND",
        Outbound => "OUTBOUND",
    }
}

/// Named view over message rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Folder {
    #[default]
    Inbox,
    Sent,
    Drafts,
    Archived,
    Trash,
    Scheduled,
}

impl Folder {
    pub const ALL: [Self; 6] = [
        Self::Inbox,
        Self::Sent,
        Self::Drafts,
        Self::Archived,
        Self::Trash,
        Self::Scheduled,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Sent => "sent",
            Self::Drafts => "drafts",
            Self::Archived => "archived",
            Self::Trash => "trash",
            Self::Scheduled => "scheduled",
        }
    }

    /// Whether a message with these attributes belongs to the folder.
    pub fn admits(self, kind: MessageType, status: MessageStatus, is_draft: bool) -> bool {
        match self {
            Self::Inbox => {
                kind == MessageType::Inbound
                    && !matches!(status, MessageStatus::Archived | MessageStatus::Trash)
            }
            Self::Sent => kind == MessageType::Outbound && !is_draft,
            Self::Drafts => kind == MessageType::Outbound && is_draft,
            Self::Archived => status == MessageStatus::Archived,
            Self::Trash => status == MessageStatus::Trash,
            Self::Scheduled => status == MessageStatus::Scheduled,
        }
    }

    /// The sent folder only lists the requesting admin's own messages.
    pub const fn is_owner_scoped(self) -> bool {
        matches!(self, Self::Sent)
    }
}

impl fmt::Display for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Folder {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|folder| folder.as_str() == wanted)
            .ok_or_else(|| UnknownVariant {
                kind: "Folder",
                value: s.to_string(),
            })
    }
}

/// Inbound mail is never a draft and never scheduled.
pub fn invariant_holds(kind: MessageType, status: MessageStatus, is_draft: bool) -> bool {
    kind == MessageType::Outbound || (!is_draft && status != MessageStatus::Scheduled)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot {action} a message that is {from}")]
    NotPermitted {
        action: StatusAction,
        from: MessageStatus,
    },

    #[error("status {0} can only be reached by sending or scheduling")]
    NotSettable(MessageStatus),

    #[error("scheduled time must be in the future")]
    ScheduleInPast,

    #[error("message is not scheduled")]
    NotScheduled,

    #[error("only outbound messages can be sent or scheduled")]
    NotOutbound,

    #[error("message has already been sent")]
    AlreadySent,
}

/// User-triggered status changes, single or bulk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusAction {
    Archive,
    Unarchive,
    Trash,
    Restore,
    MarkRead,
    MarkUnread,
}

impl StatusAction {
    pub const ALL: [Self; 6] = [
        Self::Archive,
        Self::Unarchive,
        Self::Trash,
        Self::Restore,
        Self::MarkRead,
        Self::MarkUnread,
    ];

    pub const fn target(self) -> MessageStatus {
        match self {
            Self::Archive => MessageStatus::Archived,
            Self::Trash => MessageStatus::Trash,
            Self::MarkUnread => MessageStatus::Unread,
            Self::Unarchive | Self::Restore | Self::MarkRead => MessageStatus::Read,
        }
    }

    pub fn permits(self, current: MessageStatus) -> bool {
        match self {
            Self::Archive => current != MessageStatus::Trash,
            Self::Unarchive => current == MessageStatus::Archived,
            Self::Restore => current == MessageStatus::Trash,
            Self::MarkRead => current == MessageStatus::Unread,
            Self::Trash | Self::MarkUnread => true,
        }
    }

    pub fn apply(self, current: MessageStatus) -> Result<MessageStatus, TransitionError> {
        if self.permits(current) {
            Ok(self.target())
        } else {
            Err(TransitionError::NotPermitted {
                action: self,
                from: current,
            })
        }
    }

    /// Picks the action a requested target status stands for, given the
    /// message's current status. `READ` means unarchive for archived mail,
    /// restore for trashed mail and mark-read otherwise.
    pub fn for_target(
        target: MessageStatus,
        current: MessageStatus,
    ) -> Result<Self, TransitionError> {
        match target {
            MessageStatus::Archived => Ok(Self::Archive),
            MessageStatus::Trash => Ok(Self::Trash),
            MessageStatus::Unread => Ok(Self::MarkUnread),
            MessageStatus::Read => Ok(match current {
                MessageStatus::Archived => Self::Unarchive,
                MessageStatus::Trash => Self::Restore,
                _ => Self::MarkRead,
            }),
            MessageStatus::Scheduled | MessageStatus::Sent => {
                Err(TransitionError::NotSettable(target))
            }
        }
    }
}

impl fmt::Display for StatusAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Archive => "archive",
            Self::Unarchive => "unarchive",
            Self::Trash => "trash",
            Self::Restore => "restore",
            Self::MarkRead => "mark read",
            Self::MarkUnread => "mark unread",
        })
    }
}

/// Status a message moves to when `target` is requested for it.
pub fn resolve_target(
    target: MessageStatus,
    current: MessageStatus,
) -> Result<MessageStatus, TransitionError> {
    StatusAction::for_target(target, current)?.apply(current)
}

/// Current statuses a batch update to `target` may touch. Rows in any other
/// status are left alone by the batch.
pub fn batch_sources(target: MessageStatus) -> Result<Vec<MessageStatus>, TransitionError> {
    if matches!(target, MessageStatus::Scheduled | MessageStatus::Sent) {
        return Err(TransitionError::NotSettable(target));
    }
    Ok(MessageStatus::ALL
        .iter()
        .copied()
        .filter(|current| resolve_target(target, *current).is_ok())
        .collect())
}

/// What happens to an outbound message when it is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPlan {
    SendNow,
    Schedule(DateTime<Utc>),
    SaveDraft,
}

impl DeliveryPlan {
    pub fn choose(
        scheduled_for: Option<DateTime<Utc>>,
        save_as_draft: bool,
        now: DateTime<Utc>,
    ) -> Result<Self, TransitionError> {
        if save_as_draft {
            return Ok(Self::SaveDraft);
        }
        match scheduled_for {
            Some(at) if at <= now => Err(TransitionError::ScheduleInPast),
            Some(at) => Ok(Self::Schedule(at)),
            None => Ok(Self::SendNow),
        }
    }

    /// Status and draft flag the row is written with.
    pub const fn outcome(self) -> (MessageStatus, bool) {
        match self {
            Self::SendNow => (MessageStatus::Read, false),
            Self::Schedule(_) => (MessageStatus::Scheduled, false),
            Self::SaveDraft => (MessageStatus::Read, true),
        }
    }

    pub const fn scheduled_for(self) -> Option<DateTime<Utc>> {
        match self {
            Self::Schedule(at) => Some(at),
            Self::SendNow | Self::SaveDraft => None,
        }
    }
}

/// Draft flag after a status change. Outbound mail that was never
/// delivered goes back to being a draft once it leaves SCHEDULED.
pub fn settles_as_draft(kind: MessageType, is_draft: bool, delivered: bool) -> bool {
    is_draft || (kind == MessageType::Outbound && !delivered)
}

/// Whether an existing row may be submitted again as an outbound message:
/// only drafts qualify (new messages have no row yet).
pub fn check_resubmittable(
    kind: MessageType,
    status: MessageStatus,
    is_draft: bool,
) -> Result<(), TransitionError> {
    if kind != MessageType::Outbound {
        return Err(TransitionError::NotOutbound);
    }
    if status == MessageStatus::Sent || !is_draft {
        return Err(TransitionError::AlreadySent);
    }
    Ok(())
}

/// A scheduled message handed to the transport, either by the sweeper or a
/// manual send-now, becomes SENT on success.
pub fn check_deliverable(status: MessageStatus) -> Result<MessageStatus, TransitionError> {
    match status {
        MessageStatus::Scheduled => Ok(MessageStatus::Sent),
        _ => Err(TransitionError::NotScheduled),
    }
}

/// Cancelling a schedule turns the message back into a draft.
pub fn check_cancellable(status: MessageStatus) -> Result<(MessageStatus, bool), TransitionError> {
    match status {
        MessageStatus::Scheduled => Ok((MessageStatus::Read, true)),
        _ => Err(TransitionError::NotScheduled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    #[test]
    fn test_folder_predicates() {
        use MessageStatus::*;
        use MessageType::*;

        assert!(Folder::Inbox.admits(Inbound, Unread, false));
        assert!(Folder::Inbox.admits(Inbound, Read, false));
        assert!(!Folder::Inbox.admits(Inbound, Archived, false));
        assert!(!Folder::Inbox.admits(Inbound, Trash, false));
        assert!(!Folder::Inbox.admits(Outbound, Read, false));

        assert!(Folder::Sent.admits(Outbound, Sent, false));
        assert!(Folder::Sent.admits(Outbound, Read, false));
        assert!(!Folder::Sent.admits(Outbound, Read, true));

        assert!(Folder::Drafts.admits(Outbound, Read, true));
        assert!(!Folder::Drafts.admits(Inbound, Read, true));

        assert!(Folder::Archived.admits(Inbound, Archived, false));
        assert!(Folder::Archived.admits(Outbound, Archived, false));
        assert!(Folder::Trash.admits(Outbound, Trash, false));
        assert!(Folder::Scheduled.admits(Outbound, Scheduled, false));
        assert!(!Folder::Scheduled.admits(Outbound, Sent, false));
    }

    #[test]
    fn test_folder_parse() {
        assert_eq!("Inbox".parse::<Folder>(), Ok(Folder::Inbox));
        assert_eq!("scheduled".parse::<Folder>(), Ok(Folder::Scheduled));
        assert!("spam".parse::<Folder>().is_err());
    }

    #[test]
    fn test_transition_table() {
        use MessageStatus::*;

        assert_eq!(StatusAction::Archive.apply(Unread), Ok(Archived));
        assert_eq!(StatusAction::Archive.apply(Sent), Ok(Archived));
        assert!(StatusAction::Archive.apply(Trash).is_err());

        assert_eq!(StatusAction::Unarchive.apply(Archived), Ok(Read));
        assert!(StatusAction::Unarchive.apply(Read).is_err());

        for status in MessageStatus::ALL {
            assert_eq!(StatusAction::Trash.apply(*status), Ok(Trash));
            assert_eq!(StatusAction::MarkUnread.apply(*status), Ok(Unread));
        }

        assert_eq!(StatusAction::MarkRead.apply(Unread), Ok(Read));
        assert!(StatusAction::MarkRead.apply(Sent).is_err());
        assert_eq!(StatusAction::Restore.apply(Trash), Ok(Read));
    }

    #[test]
    fn test_archive_then_unarchive_lands_on_read() {
        let archived = resolve_target(MessageStatus::Archived, MessageStatus::Unread).unwrap();
        let restored = resolve_target(MessageStatus::Read, archived).unwrap();
        assert_eq!(restored, MessageStatus::Read);
    }

    #[test]
    fn test_scheduled_and_sent_are_not_settable() {
        assert_eq!(
            resolve_target(MessageStatus::Scheduled, MessageStatus::Read),
            Err(TransitionError::NotSettable(MessageStatus::Scheduled))
        );
        assert!(batch_sources(MessageStatus::Sent).is_err());
    }

    #[test]
    fn test_batch_sources() {
        use MessageStatus::*;

        let archive = batch_sources(Archived).unwrap();
        assert!(!archive.contains(&Trash));
        assert_eq!(archive.len(), 5);

        let read = batch_sources(Read).unwrap();
        assert_eq!(read, vec![Unread, Archived, Trash]);

        assert_eq!(batch_sources(Trash).unwrap().len(), MessageStatus::ALL.len());
    }

    #[test]
    fn test_delivery_plan() {
        let now = Utc::now();

        assert_eq!(DeliveryPlan::choose(None, false, now), Ok(DeliveryPlan::SendNow));
        assert_eq!(
            DeliveryPlan::choose(Some(now - Duration::minutes(1)), false, now),
            Err(TransitionError::ScheduleInPast)
        );
        assert_eq!(
            DeliveryPlan::choose(Some(now), false, now),
            Err(TransitionError::ScheduleInPast)
        );

        let later = now + Duration::hours(1);
        let plan = DeliveryPlan::choose(Some(later), false, now).unwrap();
        assert_eq!(plan.outcome(), (MessageStatus::Scheduled, false));
        assert_eq!(plan.scheduled_for(), Some(later));

        // a draft ignores any requested time
        let draft = DeliveryPlan::choose(Some(later), true, now).unwrap();
        assert_eq!(draft, DeliveryPlan::SaveDraft);
        assert_eq!(draft.outcome(), (MessageStatus::Read, true));
        assert_eq!(DeliveryPlan::SendNow.outcome(), (MessageStatus::Read, false));
    }

    #[test]
    fn test_resubmit_only_drafts() {
        use MessageStatus::*;
        use MessageType::*;

        assert!(check_resubmittable(Outbound, Read, true).is_ok());
        assert_eq!(check_resubmittable(Inbound, Unread, false), Err(TransitionError::NotOutbound));
        assert_eq!(check_resubmittable(Outbound, Sent, false), Err(TransitionError::AlreadySent));
        assert_eq!(check_resubmittable(Outbound, Read, false), Err(TransitionError::AlreadySent));
    }

    #[test]
    fn test_delivery_and_cancel_need_scheduled() {
        assert_eq!(check_deliverable(MessageStatus::Scheduled), Ok(MessageStatus::Sent));
        assert_eq!(check_deliverable(MessageStatus::Sent), Err(TransitionError::NotScheduled));
        assert_eq!(
            check_cancellable(MessageStatus::Scheduled),
            Ok((MessageStatus::Read, true))
        );
        assert!(check_cancellable(MessageStatus::Read).is_err());
    }

    #[test]
    fn test_undelivered_outbound_settles_as_draft() {
        use MessageType::*;

        assert!(settles_as_draft(Outbound, false, false));
        assert!(settles_as_draft(Outbound, true, false));
        assert!(!settles_as_draft(Outbound, false, true));
        assert!(!settles_as_draft(Inbound, false, false));

        // trashed then restored, a scheduled message is a draft again
        let trashed = resolve_target(MessageStatus::Trash, MessageStatus::Scheduled).unwrap();
        let restored = resolve_target(MessageStatus::Read, trashed).unwrap();
        let is_draft = settles_as_draft(Outbound, false, false);
        assert!(Folder::Drafts.admits(Outbound, restored, is_draft));
        assert!(!Folder::Sent.admits(Outbound, restored, is_draft));
    }

    #[test]
    fn test_status_roundtrips_through_text() {
        for status in MessageStatus::ALL {
            assert_eq!(status.as_str().parse::<MessageStatus>(), Ok(*status));
        }
        assert_eq!(
            serde_json::to_string(&MessageStatus::Scheduled).unwrap(),
            "\"SCHEDULED\""
        );
        assert!("CLAIMED".parse::<MessageStatus>().is_err());
    }

    fn any_status() -> impl Strategy<Value = MessageStatus> {
        proptest::sample::select(MessageStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_inbound_never_scheduled_or_draft(targets in proptest::collection::vec(any_status(), 0..32)) {
            let mut status = MessageStatus::Unread;
            for target in targets {
                if let Ok(next) = resolve_target(target, status) {
                    status = next;
                }
                prop_assert!(invariant_holds(MessageType::Inbound, status, false));
            }
        }

        #[test]
        fn prop_batch_sources_agree_with_single_item(target in any_status(), current in any_status()) {
            if let Ok(sources) = batch_sources(target) {
                prop_assert_eq!(sources.contains(&current), resolve_target(target, current).is_ok());
            }
        }
    }
}
