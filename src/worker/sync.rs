//! Background sync: replay contact form submissions queued while offline.

use color_eyre::Result;
use tracing::{debug, info, warn};

use super::events::EventOutcome;
use super::lifecycle::ServiceWorker;
use crate::cache::WorkerStorage;
use crate::http::Request;
use crate::network::Network;

/// Sync tag registered by the contact form.
pub const CONTACT_FORM_TAG: &str = "contact-form";

impl<S, N> ServiceWorker<S, N>
where
  S: WorkerStorage + ?Sized + 'static,
  N: Network + ?Sized + 'static,
{
  pub(super) async fn handle_sync(&self, tag: &str) -> Result<EventOutcome> {
    if tag != CONTACT_FORM_TAG {
      debug!(tag, "No handler for sync tag");
      return Ok(EventOutcome::Ignored);
    }

    let endpoint = self.resolve(&self.contact_endpoint)?;
    let pending = self.storage.pending(tag)?;
    let mut submitted = 0;
    let mut remaining = 0;

    for submission in &pending {
      let request = Request::post_json(endpoint.clone(), &submission.payload)?;
      match self.network.fetch(&request).await {
        Ok(response) if response.ok() => {
          submitted += 1;
          info!(id = submission.id, "Offline form submitted successfully");
          // Left queued on failure, so the next sync submits it again
          if let Err(e) = self.storage.remove(submission.id) {
            warn!(id = submission.id, "Failed to dequeue submitted form: {:#}", e);
            remaining += 1;
          }
        }
        Ok(response) => {
          warn!(
            id = submission.id,
            status = response.status,
            "Offline form submission rejected"
          );
          remaining += 1;
        }
        Err(e) => {
          warn!(id = submission.id, "Failed to submit offline form: {:#}", e);
          remaining += 1;
        }
      }
    }

    Ok(EventOutcome::Synced {
      submitted,
      remaining,
    })
  }
}
