//! Optimistic step reply threads.
//!
//! Unlike every other mutation in this crate, posting a reply updates
//! local state immediately and reconciles against the service on the next
//! refresh. This is the one deliberately optimistic subsystem; do not fold
//! it into the re-fetch-after-write path.

use std::collections::HashMap;

use chrono::Utc;

use trellis_client::Reply;
use trellis_template::{InstanceId, StepId};

/// A reply plus whether it is still awaiting server confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadReply {
  pub reply: Reply,
  pub pending: bool,
}

/// Local reply threads keyed by `(instance, step)`.
#[derive(Debug, Default)]
pub struct ReplyThreads {
  threads: HashMap<(InstanceId, StepId), Vec<ThreadReply>>,
}

impl ReplyThreads {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a reply locally before the network call resolves.
  pub fn append_optimistic(
    &mut self,
    instance: InstanceId,
    step: StepId,
    author: &str,
    body: &str,
  ) {
    self.threads.entry((instance, step)).or_default().push(ThreadReply {
      reply: Reply {
        id: None,
        author: author.to_string(),
        body: body.to_string(),
        at: Utc::now(),
      },
      pending: true,
    });
  }

  /// Drop a pending reply whose post failed.
  pub fn remove_pending(&mut self, instance: InstanceId, step: StepId, body: &str) {
    if let Some(thread) = self.threads.get_mut(&(instance, step)) {
      if let Some(index) = thread
        .iter()
        .rposition(|r| r.pending && r.reply.body == body)
      {
        thread.remove(index);
      }
    }
  }

  /// Replace the thread with the server's list, keeping pending replies
  /// the server has not echoed back yet.
  pub fn reconcile(&mut self, instance: InstanceId, step: StepId, server: Vec<Reply>) {
    let thread = self.threads.entry((instance, step)).or_default();

    let unconfirmed: Vec<ThreadReply> = thread
      .iter()
      .filter(|r| {
        r.pending
          && !server
            .iter()
            .any(|s| s.author == r.reply.author && s.body == r.reply.body)
      })
      .cloned()
      .collect();

    *thread = server
      .into_iter()
      .map(|reply| ThreadReply {
        reply,
        pending: false,
      })
      .chain(unconfirmed)
      .collect();
  }

  pub fn get(&self, instance: InstanceId, step: StepId) -> &[ThreadReply] {
    self
      .threads
      .get(&(instance, step))
      .map(|t| t.as_slice())
      .unwrap_or(&[])
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  const I: InstanceId = InstanceId(1);
  const S: StepId = StepId(2);

  fn server_reply(id: i64, author: &str, body: &str) -> Reply {
    Reply {
      id: Some(id),
      author: author.to_string(),
      body: body.to_string(),
      at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
    }
  }

  #[test]
  fn test_optimistic_append_is_immediately_visible() {
    let mut threads = ReplyThreads::new();
    threads.append_optimistic(I, S, "dana", "looks good");

    let thread = threads.get(I, S);
    assert_eq!(thread.len(), 1);
    assert!(thread[0].pending);
    assert_eq!(thread[0].reply.body, "looks good");
  }

  #[test]
  fn test_reconcile_confirms_echoed_reply() {
    let mut threads = ReplyThreads::new();
    threads.append_optimistic(I, S, "dana", "looks good");
    threads.reconcile(I, S, vec![server_reply(7, "dana", "looks good")]);

    let thread = threads.get(I, S);
    assert_eq!(thread.len(), 1);
    assert!(!thread[0].pending);
    assert_eq!(thread[0].reply.id, Some(7));
  }

  #[test]
  fn test_reconcile_keeps_unconfirmed_pending_reply() {
    let mut threads = ReplyThreads::new();
    threads.append_optimistic(I, S, "dana", "still uploading");
    threads.reconcile(I, S, vec![server_reply(3, "amir", "earlier note")]);

    let thread = threads.get(I, S);
    assert_eq!(thread.len(), 2);
    assert_eq!(thread[0].reply.author, "amir");
    assert!(thread[1].pending);
  }

  #[test]
  fn test_failed_post_removes_only_its_pending_entry() {
    let mut threads = ReplyThreads::new();
    threads.append_optimistic(I, S, "dana", "first");
    threads.append_optimistic(I, S, "dana", "second");
    threads.remove_pending(I, S, "second");

    let thread = threads.get(I, S);
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].reply.body, "first");
  }
}
