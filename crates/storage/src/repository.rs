//! Repository Implementation

use crate::analytics::EventAnalytics;
use crate::{BiometricStore, StorageError};
use alerting::SessionSummary;
use chrono::{DateTime, Utc};
use dms::CalibrationProfile;
use identity::{validate_embedding, EmbeddingRecord, EnrolledEmbedding, User};
use perception::HeadPose;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Behavioural event record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorEventRecord {
    pub id: u64,
    pub user_id: Option<Uuid>,
    pub event: String,
    pub at: DateTime<Utc>,
}

/// Result of an identification attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessOutcome {
    Success,
    Unknown,
}

/// Access log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub id: u64,
    pub user_id: Option<Uuid>,
    pub outcome: AccessOutcome,
    pub similarity: f32,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    users: Vec<User>,
    embeddings: Vec<EmbeddingRecord>,
    events: Vec<BehaviorEventRecord>,
    access_log: Vec<AccessRecord>,
    sessions: Vec<SessionSummary>,
    next_user_seq: u32,
    next_record_id: u64,
}

impl Tables {
    fn user_mut(&mut self, id: Uuid) -> Result<&mut User, StorageError> {
        self.users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StorageError::UserNotFound(id))
    }

    fn has_user(&self, id: Uuid) -> bool {
        self.users.iter().any(|u| u.id == id)
    }

    fn next_id(&mut self) -> u64 {
        self.next_record_id += 1;
        self.next_record_id
    }
}

const DEFAULT_MAX_RECORDS: usize = 100_000;

/// Repository for biometric data (in-memory, snapshot to disk)
pub struct Repository {
    tables: Mutex<Tables>,
    /// Max records kept per log table (events, accesses, sessions)
    max_records: usize,
}

/// Drop the oldest entries so one more fits under `max`
fn make_room<T>(rows: &mut Vec<T>, max: usize) {
    let keep = max.saturating_sub(1);
    if rows.len() > keep {
        let excess = rows.len() - keep;
        rows.drain(..excess);
    }
}

impl Repository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        info!("Creating in-memory repository");
        Self {
            tables: Mutex::new(Tables {
                next_user_seq: 1,
                ..Default::default()
            }),
            max_records: DEFAULT_MAX_RECORDS,
        }
    }

    /// Cap the log tables at `max_records` rows each
    pub fn with_retention(mut self, max_records: usize) -> Self {
        self.max_records = max_records.max(1);
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StorageError> {
        self.tables
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))
    }

    /// Load a repository from a snapshot file
    pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let tables: Tables = postcard::from_bytes(&bytes)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        info!(
            "Loaded snapshot {} ({} users, {} embeddings)",
            path.display(),
            tables.users.len(),
            tables.embeddings.len()
        );
        Ok(Self {
            tables: Mutex::new(tables),
            max_records: DEFAULT_MAX_RECORDS,
        })
    }

    /// Write every table to a snapshot file
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let path = path.as_ref();
        let bytes = {
            let tables = self.lock()?;
            postcard::to_allocvec(&*tables)
                .map_err(|e| StorageError::SerializationError(e.to_string()))?
        };
        std::fs::write(path, &bytes)?;
        info!("Snapshot written to {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    pub fn users(&self) -> Result<Vec<User>, StorageError> {
        Ok(self.lock()?.users.clone())
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>, StorageError> {
        Ok(self.lock()?.users.iter().find(|u| u.id == id).cloned())
    }

    pub fn find_user_by_code(&self, code: &str) -> Result<Option<User>, StorageError> {
        Ok(self.lock()?.users.iter().find(|u| u.code == code).cloned())
    }

    /// Embeddings stored for a user, any model
    pub fn embeddings_for(&self, user_id: Uuid) -> Result<Vec<EmbeddingRecord>, StorageError> {
        Ok(self
            .lock()?
            .embeddings
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    /// Behaviour events, optionally for one user, oldest first
    pub fn events(&self, user_id: Option<Uuid>) -> Result<Vec<BehaviorEventRecord>, StorageError> {
        Ok(self
            .lock()?
            .events
            .iter()
            .filter(|r| user_id.map_or(true, |id| r.user_id == Some(id)))
            .cloned()
            .collect())
    }

    /// Access log, optionally for one user, oldest first
    pub fn access_log(&self, user_id: Option<Uuid>) -> Result<Vec<AccessRecord>, StorageError> {
        Ok(self
            .lock()?
            .access_log
            .iter()
            .filter(|r| user_id.map_or(true, |id| r.user_id == Some(id)))
            .cloned()
            .collect())
    }

    pub fn session_summaries(&self) -> Result<Vec<SessionSummary>, StorageError> {
        Ok(self.lock()?.sessions.clone())
    }

    /// KPIs over the behaviour events, optionally for one user
    pub fn analytics(&self, user_id: Option<Uuid>) -> Result<EventAnalytics, StorageError> {
        Ok(EventAnalytics::from_events(&self.events(user_id)?))
    }

    /// Remove a user with all embeddings, events, access records and
    /// session summaries
    pub fn delete_user(&self, user_id: Uuid) -> Result<User, StorageError> {
        let mut tables = self.lock()?;
        let index = tables
            .users
            .iter()
            .position(|u| u.id == user_id)
            .ok_or(StorageError::UserNotFound(user_id))?;
        let user = tables.users.remove(index);

        tables.embeddings.retain(|e| e.user_id != user_id);
        tables.events.retain(|r| r.user_id != Some(user_id));
        tables.access_log.retain(|r| r.user_id != Some(user_id));
        tables.sessions.retain(|s| s.user_id != Some(user_id));

        info!("User {} deleted with all associated records", user.code);
        Ok(user)
    }

    /// Remove everything and restart user codes at 1
    pub fn delete_all(&self) -> Result<(), StorageError> {
        let mut tables = self.lock()?;
        *tables = Tables {
            next_user_seq: 1,
            ..Default::default()
        };
        warn!("All users and records deleted");
        Ok(())
    }

    pub fn user_count(&self) -> usize {
        self.lock().map(|t| t.users.len()).unwrap_or(0)
    }

    pub fn embedding_count(&self) -> usize {
        self.lock().map(|t| t.embeddings.len()).unwrap_or(0)
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

impl BiometricStore for Repository {
    fn known_embeddings(&self, model: &str) -> Result<Vec<EnrolledEmbedding>, StorageError> {
        let tables = self.lock()?;
        let known = tables
            .embeddings
            .iter()
            .filter(|e| e.model == model)
            .filter_map(|e| {
                let user = tables.users.iter().find(|u| u.id == e.user_id)?;
                Some(EnrolledEmbedding {
                    user_id: user.id,
                    user_code: user.code.clone(),
                    vector: e.vector.clone(),
                    pose: e.pose,
                })
            })
            .collect::<Vec<_>>();
        debug!("{} known embeddings for model {}", known.len(), model);
        Ok(known)
    }

    fn register_user(&self, at: DateTime<Utc>) -> Result<User, StorageError> {
        let mut tables = self.lock()?;
        let code = format!("USUARIO_{:04}", tables.next_user_seq);
        tables.next_user_seq += 1;

        let user = User::new(code, at);
        tables.users.push(user.clone());
        info!("User {} registered with id {}", user.code, user.id);
        Ok(user)
    }

    fn add_embedding(
        &self,
        user_id: Uuid,
        vector: &[f32],
        model: &str,
        pose: Option<HeadPose>,
        at: DateTime<Utc>,
    ) -> Result<Uuid, StorageError> {
        validate_embedding(vector)?;
        let mut tables = self.lock()?;
        if !tables.has_user(user_id) {
            return Err(StorageError::UserNotFound(user_id));
        }
        let record = EmbeddingRecord {
            id: Uuid::new_v4(),
            user_id,
            vector: vector.to_vec(),
            model: model.to_string(),
            pose,
            created_at: at,
        };
        let id = record.id;
        tables.embeddings.push(record);
        debug!("Embedding {} stored for user {}", id, user_id);
        Ok(id)
    }

    fn load_calibration(&self, user_id: Uuid) -> Result<Option<CalibrationProfile>, StorageError> {
        let mut tables = self.lock()?;
        Ok(tables.user_mut(user_id)?.calibration)
    }

    fn save_calibration(
        &self,
        user_id: Uuid,
        profile: &CalibrationProfile,
    ) -> Result<(), StorageError> {
        let mut tables = self.lock()?;
        let user = tables.user_mut(user_id)?;
        user.calibration = Some(*profile);
        info!("Calibration saved for {}", user.code);
        Ok(())
    }

    fn log_behavior_event(
        &self,
        user_id: Option<Uuid>,
        event: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut tables = self.lock()?;
        if let Some(id) = user_id {
            if !tables.has_user(id) {
                return Err(StorageError::UserNotFound(id));
            }
        }
        make_room(&mut tables.events, self.max_records);
        let id = tables.next_id();
        tables.events.push(BehaviorEventRecord {
            id,
            user_id,
            event: event.to_string(),
            at,
        });
        Ok(())
    }

    fn log_access(
        &self,
        user_id: Option<Uuid>,
        outcome: AccessOutcome,
        similarity: f32,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut tables = self.lock()?;
        make_room(&mut tables.access_log, self.max_records);
        let id = tables.next_id();
        tables.access_log.push(AccessRecord {
            id,
            user_id,
            outcome,
            similarity,
            at,
        });
        debug!("Access logged: {:?} ({:.3})", outcome, similarity);
        Ok(())
    }

    fn save_session_summary(&self, summary: &SessionSummary) -> Result<(), StorageError> {
        let mut tables = self.lock()?;
        make_room(&mut tables.sessions, self.max_records);
        tables.sessions.push(summary.clone());
        info!(
            "Session summary saved ({} events)",
            summary.total_events()
        );
        Ok(())
    }
}
