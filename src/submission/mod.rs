//! Posting messages and images to the forum.

use chrono::Utc;

use crate::activity::ActivityLog;
use crate::auth::{AuthState, Identity};
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{ChatMessage, NewMessage, WriteTimestamp};
use crate::nav::Navigation;
use crate::storage::BlobStore;

pub const FALLBACK_DISPLAY_NAME: &str = "You";
pub const FALLBACK_AVATAR_URL: &str = "https://placehold.co/40x40.png";
pub const IMAGE_MESSAGE_TEXT: &str = "Uploaded an image.";
const MAX_TEXT_CHARS: usize = 2000;

/// Outcome of a submission attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Submitted {
    /// Written; carries the stored message
    Posted(ChatMessage),
    /// Nobody signed in; nothing was written
    Redirect(Navigation),
}

/// Writes forum messages on behalf of the signed-in user.
#[derive(Clone)]
pub struct Submitter {
    repo: Repository,
    blobs: BlobStore,
    activity: ActivityLog,
}

impl Submitter {
    pub fn new(repo: Repository, blobs: BlobStore, activity: ActivityLog) -> Self {
        Self {
            repo,
            blobs,
            activity,
        }
    }

    pub async fn submit_text(&self, auth: &AuthState, text: &str) -> Result<Submitted, AppError> {
        let Some(identity) = auth.identity() else {
            return Ok(Submitted::Redirect(Navigation::SignIn));
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Message text is required".to_string()));
        }
        if text.chars().count() > MAX_TEXT_CHARS {
            return Err(AppError::Validation(format!(
                "Message exceeds {} characters",
                MAX_TEXT_CHARS
            )));
        }

        let message = self
            .repo
            .add_message(&new_message(identity, text.to_string(), None))
            .await?;

        self.activity.log(
            &identity.uid,
            "Posted Message",
            format!("Sent a message in the forum. Message ID: {}", message.id),
        );

        Ok(Submitted::Posted(message))
    }

    /// Store the image first; the message is written only once its URL exists.
    pub async fn submit_image(
        &self,
        auth: &AuthState,
        data_uri: &str,
    ) -> Result<Submitted, AppError> {
        let Some(identity) = auth.identity() else {
            return Ok(Submitted::Redirect(Navigation::SignIn));
        };

        let path = format!(
            "chat-images/{}-{}",
            Utc::now().timestamp_millis(),
            uuid::Uuid::new_v4().simple()
        );
        let handle = self.blobs.upload_data_uri(&path, data_uri).await?;
        let download_url = self.blobs.download_url(&handle).await?;

        let message = self
            .repo
            .add_message(&new_message(
                identity,
                IMAGE_MESSAGE_TEXT.to_string(),
                Some(download_url),
            ))
            .await?;

        self.activity.log(
            &identity.uid,
            "Uploaded Image",
            format!("Uploaded an image to the forum. Message ID: {}", message.id),
        );

        Ok(Submitted::Posted(message))
    }
}

fn new_message(identity: &Identity, text: String, image_url: Option<String>) -> NewMessage {
    NewMessage {
        text,
        user: identity
            .display_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_DISPLAY_NAME.to_string()),
        avatar_url: identity
            .photo_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_AVATAR_URL.to_string()),
        timestamp: WriteTimestamp::Server,
        client_timestamp: Some(Utc::now()),
        image_url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::db::init_database;
    use crate::feed::MessageFeed;
    use tempfile::TempDir;

    const PIXEL: &str = "data:image/png;base64,iVBORw0KGgo=";

    struct Fixture {
        repo: Repository,
        submitter: Submitter,
        dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let repo = Repository::new(init_database(&dir.path().join("s.sqlite")).await.unwrap());
        let blobs = BlobStore::new(dir.path().join("blobs"), "http://localhost:8080", 1024);
        let submitter = Submitter::new(repo.clone(), blobs, ActivityLog::new(repo.clone()));
        Fixture {
            repo,
            submitter,
            dir,
        }
    }

    fn member(display_name: Option<&str>) -> AuthState {
        AuthState::Authenticated {
            identity: Identity {
                uid: "uid-1".into(),
                email: "ada@dubai.bits-pilani.ac.in".into(),
                display_name: display_name.map(String::from),
                photo_url: Some("https://avatars.example.org/ada.png".into()),
                hosted_domain: None,
                admin_claim: false,
            },
            role: Role::Member,
        }
    }

    #[tokio::test]
    async fn test_anonymous_text_redirects_without_writing() {
        let f = fixture().await;
        let outcome = f
            .submitter
            .submit_text(&AuthState::Anonymous, "hi")
            .await
            .unwrap();
        assert_eq!(outcome, Submitted::Redirect(Navigation::SignIn));
        assert!(f.repo.list_messages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_image_redirects_without_upload() {
        let f = fixture().await;
        let outcome = f
            .submitter
            .submit_image(&AuthState::Unknown, PIXEL)
            .await
            .unwrap();
        assert_eq!(outcome, Submitted::Redirect(Navigation::SignIn));
        assert!(f.repo.list_messages().await.unwrap().is_empty());
        assert!(!f.dir.path().join("blobs").exists());
    }

    #[tokio::test]
    async fn test_text_appears_once_in_feed() {
        let f = fixture().await;
        let feed = MessageFeed::open(&f.repo).await.unwrap();
        let mut rx = feed.watch();

        let Submitted::Posted(posted) = f
            .submitter
            .submit_text(&member(Some("Ada")), "  hello forum  ")
            .await
            .unwrap()
        else {
            panic!("expected a posted message");
        };
        assert_eq!(posted.text, "hello forum");

        let view = rx
            .wait_for(|v| v.messages.iter().any(|m| m.id == posted.id))
            .await
            .unwrap()
            .clone();
        let matching: Vec<_> = view.messages.iter().filter(|m| m.id == posted.id).collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].text, "hello forum");
        assert_eq!(matching[0].user, "Ada");
        assert_eq!(matching[0].avatar_url, "https://avatars.example.org/ada.png");
        feed.close();
    }

    #[tokio::test]
    async fn test_missing_display_name_falls_back() {
        let f = fixture().await;
        let Submitted::Posted(posted) = f
            .submitter
            .submit_text(&member(None), "hi")
            .await
            .unwrap()
        else {
            panic!("expected a posted message");
        };
        assert_eq!(posted.user, FALLBACK_DISPLAY_NAME);
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected() {
        let f = fixture().await;
        let err = f
            .submitter
            .submit_text(&member(Some("Ada")), "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_image_is_stored_before_message() {
        let f = fixture().await;
        let Submitted::Posted(posted) = f
            .submitter
            .submit_image(&member(Some("Ada")), PIXEL)
            .await
            .unwrap()
        else {
            panic!("expected a posted message");
        };
        assert_eq!(posted.text, IMAGE_MESSAGE_TEXT);
        let url = posted.image_url.unwrap();
        assert!(url.starts_with("http://localhost:8080/blobs/chat-images/"));

        let relative = url.trim_start_matches("http://localhost:8080/blobs/");
        assert!(f.dir.path().join("blobs").join(relative).exists());
    }

    #[tokio::test]
    async fn test_bad_image_writes_no_message() {
        let f = fixture().await;
        let result = f
            .submitter
            .submit_image(&member(Some("Ada")), "data:image/png;base64,@@@")
            .await;
        assert!(result.is_err());
        assert!(f.repo.list_messages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submission_logs_activity() {
        let f = fixture().await;
        f.submitter
            .submit_text(&member(Some("Ada")), "logged")
            .await
            .unwrap();

        let mut entries = Vec::new();
        for _ in 0..20 {
            entries = f.repo.list_activity(10).await.unwrap();
            if !entries.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "Posted Message");
        assert_eq!(entries[0].user_id, "uid-1");
    }
}
