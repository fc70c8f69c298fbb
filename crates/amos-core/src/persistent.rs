//! Stages that survive across requests.
//!
//! A [`PersistentStage`] belongs to one `(user_id, token)` session. Its
//! contents are serialized to JSON and kept through a [`StageStore`]; loading
//! a session that was never stored yields an empty stage.

use std::ops::{Deref, DerefMut};

use serde::Deserialize;

use crate::{
  Error, Result, Stage,
  component::{Component, ComponentKey},
  store::StageStore,
};

/// Serialized form of a stage.
#[derive(Deserialize)]
struct StagePayload {
  components: Vec<Component>,
  #[serde(default)]
  rebased:    Vec<ComponentKey>,
}

#[derive(Debug, Clone)]
pub struct PersistentStage {
  user_id: i64,
  token:   String,
  stage:   Stage,
}

impl PersistentStage {
  /// Load the stage of a session, or start an empty one.
  pub async fn instance_for_user<S: StageStore>(
    store: &S,
    user_id: i64,
    token: impl Into<String>,
  ) -> Result<Self> {
    let token = token.into();
    let payload = store
      .load_stage(user_id, token.clone())
      .await
      .map_err(Error::store)?;

    let stage = match payload {
      Some(json) => {
        let p: StagePayload = serde_json::from_str(&json)?;
        for c in &p.components {
          c.validate()?;
        }
        Stage::from_parts(p.components, p.rebased)
      }
      None => Stage::new(),
    };
    Ok(Self { user_id, token, stage })
  }

  pub fn user_id(&self) -> i64 { self.user_id }

  pub fn token(&self) -> &str { &self.token }

  /// Write the current contents back. An empty stage removes the record.
  pub async fn store<S: StageStore>(&self, store: &S) -> Result<()> {
    if self.stage.is_empty() {
      return self.discard(store).await;
    }
    let (components, rebased) = self.stage.parts();
    let json = serde_json::to_string(&serde_json::json!({
      "components": components,
      "rebased": rebased,
    }))?;
    store
      .save_stage(self.user_id, self.token.clone(), json)
      .await
      .map_err(Error::store)?;
    tracing::debug!(user = self.user_id, strings = self.stage.string_count(), "stored stage");
    Ok(())
  }

  /// Forget the stored copy of this session.
  pub async fn discard<S: StageStore>(&self, store: &S) -> Result<()> {
    store
      .delete_stage(self.user_id, self.token.clone())
      .await
      .map_err(Error::store)
  }
}

impl Deref for PersistentStage {
  type Target = Stage;

  fn deref(&self) -> &Stage { &self.stage }
}

impl DerefMut for PersistentStage {
  fn deref_mut(&mut self) -> &mut Stage { &mut self.stage }
}
