//! In-process store
//!
//! Same semantics as [`super::PgStore`] over plain collections behind one
//! `RwLock`. Every trait call takes the lock once, so multi-row writes are
//! atomic here for free. Used by the route tests and `serve --memory`.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neighborly_core::{
    poll, ComplaintStatus, DisplayName, EmailAddress, JoinCode, Paginated, Pagination, Role,
    Title, UserStatus, VerificationStatus, VoteSelection,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::*;

#[derive(Debug, Clone)]
struct LoginCode {
    code_hash: String,
    expires_at: DateTime<Utc>,
    attempts: i32,
}

#[derive(Debug, Clone, Copy)]
struct Vote {
    poll_id: Uuid,
    option_id: Uuid,
    user_id: Uuid,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    sessions: HashMap<String, SessionRecord>,
    login_codes: HashMap<String, LoginCode>,
    communities: HashMap<Uuid, Community>,
    members: Vec<Membership>,
    verifications: Vec<Verification>,
    notifications: Vec<Notification>,
    announcements: Vec<Announcement>,
    complaints: Vec<Complaint>,
    polls: Vec<Poll>,
    poll_options: Vec<PollOption>,
    votes: Vec<Vote>,
    conversations: Vec<Conversation>,
    participants: Vec<(Uuid, Uuid)>,
    messages: Vec<Message>,
    reads: HashSet<(Uuid, Uuid)>,
    feedback: Vec<Feedback>,
    analysis: HashMap<(AnalysisKind, String), serde_json::Value>,
}

impl Tables {
    fn is_member(&self, community_id: Uuid, user_id: Uuid) -> bool {
        self.members
            .iter()
            .any(|m| m.community_id == community_id && m.user_id == user_id)
    }

    fn poll_summary(&self, p: &Poll, viewer_id: Uuid, now: DateTime<Utc>) -> PollSummary {
        let votes: Vec<&Vote> = self.votes.iter().filter(|v| v.poll_id == p.id).collect();

        let mut options: Vec<PollOptionTally> = self
            .poll_options
            .iter()
            .filter(|o| o.poll_id == p.id)
            .map(|o| PollOptionTally {
                id: o.id,
                label: o.label.clone(),
                position: o.position,
                votes: votes.iter().filter(|v| v.option_id == o.id).count() as i64,
            })
            .collect();
        options.sort_by_key(|o| o.position);

        let voters: HashSet<Uuid> = votes.iter().map(|v| v.user_id).collect();
        let my_votes = votes
            .iter()
            .filter(|v| v.user_id == viewer_id)
            .map(|v| v.option_id)
            .collect();

        PollSummary {
            poll: p.clone(),
            options,
            voters: voters.len() as i64,
            my_votes,
            is_open: poll::is_open(p.closes_at, now),
        }
    }
}

/// Store backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HealthStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(
        &self,
        email: &EmailAddress,
        full_name: &DisplayName,
    ) -> Result<User, StoreError> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| u.email == email.as_str()) {
            return Err(StoreError::conflict("user", "email already registered"));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: email.as_str().to_owned(),
            full_name: full_name.as_str().to_owned(),
            status: UserStatus::Unverified,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.trim().to_lowercase();
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn set_user_status(&self, id: Uuid, status: UserStatus) -> Result<User, StoreError> {
        let mut t = self.tables.write().await;
        let user = t
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("user", id))?;
        user.status = status;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn update_user_name(
        &self,
        id: Uuid,
        full_name: &DisplayName,
    ) -> Result<User, StoreError> {
        let mut t = self.tables.write().await;
        let user = t
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("user", id))?;
        user.full_name = full_name.as_str().to_owned();
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        if t.users.remove(&id).is_none() {
            return Ok(false);
        }

        // Owned rows go with the user
        t.members.retain(|m| m.user_id != id);
        t.verifications.retain(|v| v.user_id != id);
        t.notifications.retain(|n| n.user_id != id);
        t.votes.retain(|v| v.user_id != id);
        t.participants.retain(|(_, user)| *user != id);
        t.reads.retain(|(_, user)| *user != id);

        // Authored content stays, author cleared
        for c in t.communities.values_mut() {
            if c.created_by == Some(id) {
                c.created_by = None;
            }
        }
        for v in &mut t.verifications {
            if v.reviewed_by == Some(id) {
                v.reviewed_by = None;
            }
        }
        for a in &mut t.announcements {
            if a.author_id == Some(id) {
                a.author_id = None;
            }
        }
        for c in &mut t.complaints {
            if c.author_id == Some(id) {
                c.author_id = None;
            }
        }
        for p in &mut t.polls {
            if p.author_id == Some(id) {
                p.author_id = None;
            }
        }
        for c in &mut t.conversations {
            if c.created_by == Some(id) {
                c.created_by = None;
            }
        }
        for m in &mut t.messages {
            if m.sender_id == Some(id) {
                m.sender_id = None;
            }
        }
        for f in &mut t.feedback {
            if f.user_id == Some(id) {
                f.user_id = None;
            }
        }

        Ok(true)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(
        &self,
        token_hash: &str,
        email: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<SessionRecord, StoreError> {
        let record = SessionRecord {
            token_hash: token_hash.to_owned(),
            email: email.to_owned(),
            created_at: Utc::now(),
            expires_at,
        };
        self.tables
            .write()
            .await
            .sessions
            .insert(record.token_hash.clone(), record.clone());
        Ok(record)
    }

    async fn find_session(&self, token_hash: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.tables.read().await.sessions.get(token_hash).cloned())
    }

    async fn delete_session(&self, token_hash: &str) -> Result<(), StoreError> {
        self.tables.write().await.sessions.remove(token_hash);
        Ok(())
    }

    async fn put_login_code(
        &self,
        email: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.tables.write().await.login_codes.insert(
            email.to_owned(),
            LoginCode {
                code_hash: code_hash.to_owned(),
                expires_at,
                attempts: 0,
            },
        );
        Ok(())
    }

    async fn consume_login_code(
        &self,
        email: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        let Some(entry) = t.login_codes.get_mut(email) else {
            return Ok(false);
        };

        if entry.expires_at <= now {
            t.login_codes.remove(email);
            return Ok(false);
        }

        if entry.code_hash == code_hash {
            t.login_codes.remove(email);
            return Ok(true);
        }

        entry.attempts += 1;
        if entry.attempts >= MAX_LOGIN_ATTEMPTS {
            t.login_codes.remove(email);
        }
        Ok(false)
    }
}

#[async_trait]
impl CommunityStore for MemoryStore {
    async fn create_community(
        &self,
        name: &Title,
        code: &JoinCode,
        description: Option<&str>,
        creator_id: Uuid,
    ) -> Result<Community, StoreError> {
        let mut t = self.tables.write().await;
        if t.communities.values().any(|c| c.code == code.as_str()) {
            return Err(StoreError::conflict("community", "join code already in use"));
        }
        if !t.users.contains_key(&creator_id) {
            return Err(StoreError::not_found("user", creator_id));
        }

        let now = Utc::now();
        let community = Community {
            id: Uuid::new_v4(),
            name: name.as_str().to_owned(),
            code: code.as_str().to_owned(),
            description: description.map(str::to_owned),
            created_by: Some(creator_id),
            created_at: now,
        };
        t.communities.insert(community.id, community.clone());
        t.members.push(Membership {
            community_id: community.id,
            user_id: creator_id,
            role: Role::Admin,
            joined_at: now,
        });
        Ok(community)
    }

    async fn find_community(&self, id: Uuid) -> Result<Option<Community>, StoreError> {
        Ok(self.tables.read().await.communities.get(&id).cloned())
    }

    async fn find_community_by_code(
        &self,
        code: &JoinCode,
    ) -> Result<Option<Community>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .communities
            .values()
            .find(|c| c.code.eq_ignore_ascii_case(code.as_str()))
            .cloned())
    }

    async fn list_communities_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<CommunityWithRole>, StoreError> {
        let t = self.tables.read().await;
        let mut items: Vec<CommunityWithRole> = t
            .members
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| {
                t.communities.get(&m.community_id).map(|c| CommunityWithRole {
                    community: c.clone(),
                    role: m.role,
                })
            })
            .collect();
        items.sort_by(|a, b| a.community.name.cmp(&b.community.name));
        Ok(items)
    }

    async fn add_member(
        &self,
        community_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<Membership, StoreError> {
        let mut t = self.tables.write().await;
        if !t.communities.contains_key(&community_id) {
            return Err(StoreError::not_found("community", community_id));
        }
        if !t.users.contains_key(&user_id) {
            return Err(StoreError::not_found("user", user_id));
        }
        if t.is_member(community_id, user_id) {
            return Err(StoreError::conflict("membership", "already a member"));
        }

        let membership = Membership {
            community_id,
            user_id,
            role,
            joined_at: Utc::now(),
        };
        t.members.push(membership.clone());
        Ok(membership)
    }

    async fn find_membership(
        &self,
        community_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .members
            .iter()
            .find(|m| m.community_id == community_id && m.user_id == user_id)
            .cloned())
    }

    async fn list_members(&self, community_id: Uuid) -> Result<Vec<MemberProfile>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.members
            .iter()
            .filter(|m| m.community_id == community_id)
            .filter_map(|m| {
                t.users.get(&m.user_id).map(|u| MemberProfile {
                    user_id: u.id,
                    email: u.email.clone(),
                    full_name: u.full_name.clone(),
                    status: u.status,
                    role: m.role,
                    joined_at: m.joined_at,
                })
            })
            .collect())
    }

    async fn set_member_role(
        &self,
        community_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<Membership, StoreError> {
        let mut t = self.tables.write().await;
        let membership = t
            .members
            .iter_mut()
            .find(|m| m.community_id == community_id && m.user_id == user_id)
            .ok_or_else(|| StoreError::not_found("membership", user_id))?;
        membership.role = role;
        Ok(membership.clone())
    }

    async fn remove_member(&self, community_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        let before = t.members.len();
        t.members
            .retain(|m| !(m.community_id == community_id && m.user_id == user_id));
        Ok(t.members.len() != before)
    }

    async fn remove_memberships_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut t = self.tables.write().await;
        let before = t.members.len();
        t.members.retain(|m| m.user_id != user_id);
        Ok((before - t.members.len()) as u64)
    }

    async fn community_stats(
        &self,
        community_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CommunityStats, StoreError> {
        let t = self.tables.read().await;
        let mut stats = CommunityStats::default();

        for m in t.members.iter().filter(|m| m.community_id == community_id) {
            stats.members += 1;
            match m.role {
                Role::Admin => stats.admins += 1,
                Role::Resident => stats.residents += 1,
                Role::Guest => stats.guests += 1,
            }
        }

        stats.pending_verifications = t
            .verifications
            .iter()
            .filter(|v| v.status == VerificationStatus::Pending)
            .filter(|v| t.is_member(community_id, v.user_id))
            .count() as i64;

        stats.open_complaints = t
            .complaints
            .iter()
            .filter(|c| c.community_id == community_id && !c.status.is_closed())
            .count() as i64;

        stats.active_polls = t
            .polls
            .iter()
            .filter(|p| p.community_id == community_id && poll::is_open(p.closes_at, now))
            .count() as i64;

        stats.announcements = t
            .announcements
            .iter()
            .filter(|a| a.community_id == community_id)
            .count() as i64;

        let ratings: Vec<f64> = t
            .feedback
            .iter()
            .filter(|f| f.community_id == community_id)
            .map(|f| f64::from(f.rating))
            .collect();
        stats.feedback_count = ratings.len() as i64;
        if !ratings.is_empty() {
            stats.average_rating = Some(ratings.iter().sum::<f64>() / ratings.len() as f64);
        }

        Ok(stats)
    }
}

#[async_trait]
impl VerificationStore for MemoryStore {
    async fn create_verification(&self, new: NewVerification) -> Result<Verification, StoreError> {
        let mut t = self.tables.write().await;
        if !t.users.contains_key(&new.user_id) {
            return Err(StoreError::not_found("user", new.user_id));
        }

        let verification = Verification {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            document_type: new.document_type,
            document_key: new.document_key,
            content_type: new.content_type,
            status: VerificationStatus::Pending,
            submitted_at: Utc::now(),
            reviewed_at: None,
            reviewed_by: None,
            approved_at: None,
            rejection_reason: None,
        };
        t.verifications.push(verification.clone());
        Ok(verification)
    }

    async fn find_verification(&self, id: Uuid) -> Result<Option<Verification>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .verifications
            .iter()
            .find(|v| v.id == id)
            .cloned())
    }

    async fn latest_verification_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Verification>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .verifications
            .iter()
            .rev()
            .find(|v| v.user_id == user_id)
            .cloned())
    }

    async fn list_verifications_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Verification>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .verifications
            .iter()
            .rev()
            .filter(|v| v.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_verifications_for_community(
        &self,
        community_id: Uuid,
        status: Option<VerificationStatus>,
    ) -> Result<Vec<VerificationWithUser>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.verifications
            .iter()
            .rev()
            .filter(|v| status.map_or(true, |s| v.status == s))
            .filter(|v| t.is_member(community_id, v.user_id))
            .filter_map(|v| {
                t.users.get(&v.user_id).map(|u| VerificationWithUser {
                    verification: v.clone(),
                    email: u.email.clone(),
                    full_name: u.full_name.clone(),
                })
            })
            .collect())
    }

    async fn review_verification(
        &self,
        id: Uuid,
        status: VerificationStatus,
        reviewer_id: Uuid,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Verification, StoreError> {
        let mut t = self.tables.write().await;
        let verification = t
            .verifications
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| StoreError::not_found("verification", id))?;

        if verification.status != VerificationStatus::Pending {
            return Err(StoreError::conflict("verification", "already reviewed"));
        }

        verification.status = status;
        verification.reviewed_at = Some(now);
        verification.reviewed_by = Some(reviewer_id);
        verification.rejection_reason = reason.map(str::to_owned);
        if status == VerificationStatus::Approved {
            verification.approved_at = Some(now);
        }
        Ok(verification.clone())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create_notifications(&self, items: Vec<NewNotification>) -> Result<u64, StoreError> {
        let mut t = self.tables.write().await;
        let now = Utc::now();
        let count = items.len() as u64;
        t.notifications
            .extend(items.into_iter().map(|n| Notification {
                id: Uuid::new_v4(),
                user_id: n.user_id,
                kind: n.kind,
                title: n.title,
                body: n.body,
                link: n.link,
                read_at: None,
                created_at: now,
            }));
        Ok(count)
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: u32,
    ) -> Result<Vec<Notification>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id && (!unread_only || n.read_at.is_none()))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(
        &self,
        id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        match t
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
        {
            Some(n) => {
                n.read_at.get_or_insert(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_notifications_read(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut t = self.tables.write().await;
        let mut count = 0;
        for n in t
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && n.read_at.is_none())
        {
            n.read_at = Some(now);
            count += 1;
        }
        Ok(count)
    }
}

#[async_trait]
impl AnnouncementStore for MemoryStore {
    async fn create_announcement(
        &self,
        new: NewAnnouncement,
    ) -> Result<Announcement, StoreError> {
        let announcement = Announcement {
            id: Uuid::new_v4(),
            community_id: new.community_id,
            author_id: Some(new.author_id),
            title: new.title,
            body: new.body,
            pinned: new.pinned,
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .announcements
            .push(announcement.clone());
        Ok(announcement)
    }

    async fn list_announcements(
        &self,
        community_id: Uuid,
        page: Pagination,
    ) -> Result<Paginated<Announcement>, StoreError> {
        let t = self.tables.read().await;
        let mut items: Vec<Announcement> = t
            .announcements
            .iter()
            .rev()
            .filter(|a| a.community_id == community_id)
            .cloned()
            .collect();
        // Stable sort keeps newest-first within each group
        items.sort_by_key(|a| !a.pinned);
        Ok(page.apply(&items))
    }

    async fn find_announcement(&self, id: Uuid) -> Result<Option<Announcement>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .announcements
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn delete_announcement(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        let before = t.announcements.len();
        t.announcements.retain(|a| a.id != id);
        Ok(t.announcements.len() != before)
    }
}

#[async_trait]
impl ComplaintStore for MemoryStore {
    async fn create_complaint(&self, new: NewComplaint) -> Result<Complaint, StoreError> {
        let now = Utc::now();
        let complaint = Complaint {
            id: Uuid::new_v4(),
            community_id: new.community_id,
            author_id: Some(new.author_id),
            title: new.title,
            description: new.description,
            category: new.category,
            status: ComplaintStatus::Open,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.complaints.push(complaint.clone());
        Ok(complaint)
    }

    async fn list_complaints(
        &self,
        community_id: Uuid,
        filter: ComplaintFilter,
    ) -> Result<Vec<Complaint>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .complaints
            .iter()
            .rev()
            .filter(|c| c.community_id == community_id)
            .filter(|c| filter.author_id.map_or(true, |id| c.author_id == Some(id)))
            .filter(|c| filter.status.map_or(true, |s| c.status == s))
            .cloned()
            .collect())
    }

    async fn find_complaint(&self, id: Uuid) -> Result<Option<Complaint>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .complaints
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn update_complaint_status(
        &self,
        id: Uuid,
        status: ComplaintStatus,
        now: DateTime<Utc>,
    ) -> Result<Complaint, StoreError> {
        let mut t = self.tables.write().await;
        let complaint = t
            .complaints
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::not_found("complaint", id))?;
        complaint.status = status;
        complaint.updated_at = now;
        Ok(complaint.clone())
    }
}

#[async_trait]
impl PollStore for MemoryStore {
    async fn create_poll(&self, new: NewPoll) -> Result<(Poll, Vec<PollOption>), StoreError> {
        let mut t = self.tables.write().await;
        if !t.communities.contains_key(&new.community_id) {
            return Err(StoreError::not_found("community", new.community_id));
        }

        let poll = Poll {
            id: Uuid::new_v4(),
            community_id: new.community_id,
            author_id: Some(new.author_id),
            question: new.draft.question.into_string(),
            allow_multiple: new.draft.allow_multiple,
            closes_at: new.draft.closes_at,
            created_at: Utc::now(),
        };
        let options: Vec<PollOption> = new
            .draft
            .options
            .into_iter()
            .enumerate()
            .map(|(position, label)| PollOption {
                id: Uuid::new_v4(),
                poll_id: poll.id,
                label,
                position: position as i32,
            })
            .collect();

        t.polls.push(poll.clone());
        t.poll_options.extend(options.iter().cloned());
        Ok((poll, options))
    }

    async fn find_poll(&self, id: Uuid) -> Result<Option<Poll>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .polls
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn poll_options(&self, poll_id: Uuid) -> Result<Vec<PollOption>, StoreError> {
        let t = self.tables.read().await;
        let mut options: Vec<PollOption> = t
            .poll_options
            .iter()
            .filter(|o| o.poll_id == poll_id)
            .cloned()
            .collect();
        options.sort_by_key(|o| o.position);
        Ok(options)
    }

    async fn poll_summary(
        &self,
        poll_id: Uuid,
        viewer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<PollSummary>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.polls
            .iter()
            .find(|p| p.id == poll_id)
            .map(|p| t.poll_summary(p, viewer_id, now)))
    }

    async fn list_polls(
        &self,
        community_id: Uuid,
        viewer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<PollSummary>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.polls
            .iter()
            .rev()
            .filter(|p| p.community_id == community_id)
            .map(|p| t.poll_summary(p, viewer_id, now))
            .collect())
    }

    async fn replace_votes(
        &self,
        poll_id: Uuid,
        user_id: Uuid,
        selection: &VoteSelection,
    ) -> Result<u64, StoreError> {
        let mut t = self.tables.write().await;
        if !t.polls.iter().any(|p| p.id == poll_id) {
            return Err(StoreError::not_found("poll", poll_id));
        }

        t.votes
            .retain(|v| !(v.poll_id == poll_id && v.user_id == user_id));
        t.votes
            .extend(selection.option_ids().iter().map(|option_id| Vote {
                poll_id,
                option_id: *option_id,
                user_id,
            }));
        Ok(selection.len() as u64)
    }

    async fn count_user_votes(&self, poll_id: Uuid, user_id: Uuid) -> Result<i64, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .votes
            .iter()
            .filter(|v| v.poll_id == poll_id && v.user_id == user_id)
            .count() as i64)
    }

    async fn delete_poll(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        let before = t.polls.len();
        t.polls.retain(|p| p.id != id);
        if t.polls.len() == before {
            return Ok(false);
        }
        t.poll_options.retain(|o| o.poll_id != id);
        t.votes.retain(|v| v.poll_id != id);
        Ok(true)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create_conversation(
        &self,
        community_id: Uuid,
        created_by: Uuid,
        participants: &[Uuid],
    ) -> Result<Conversation, StoreError> {
        let mut t = self.tables.write().await;
        let conversation = Conversation {
            id: Uuid::new_v4(),
            community_id,
            created_by: Some(created_by),
            created_at: Utc::now(),
        };

        let mut seen = HashSet::new();
        let everyone = std::iter::once(created_by).chain(participants.iter().copied());
        for user_id in everyone.filter(|id| seen.insert(*id)) {
            t.participants.push((conversation.id, user_id));
        }
        t.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .conversations
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn conversation_participants(&self, id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .participants
            .iter()
            .filter(|(conversation, _)| *conversation == id)
            .map(|(_, user)| *user)
            .collect())
    }

    async fn list_conversations(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConversationSummary>, StoreError> {
        let t = self.tables.read().await;
        let mut items: Vec<ConversationSummary> = t
            .conversations
            .iter()
            .filter(|c| t.participants.contains(&(c.id, user_id)))
            .map(|c| {
                let messages: Vec<&Message> = t
                    .messages
                    .iter()
                    .filter(|m| m.conversation_id == c.id)
                    .collect();
                let unread_count = messages
                    .iter()
                    .filter(|m| m.sender_id != Some(user_id))
                    .filter(|m| !t.reads.contains(&(m.id, user_id)))
                    .count() as i64;
                ConversationSummary {
                    id: c.id,
                    community_id: c.community_id,
                    participants: t
                        .participants
                        .iter()
                        .filter(|(conversation, _)| *conversation == c.id)
                        .map(|(_, user)| *user)
                        .collect(),
                    last_message: messages.last().map(|m| (*m).clone()),
                    unread_count,
                    created_at: c.created_at,
                }
            })
            .collect();

        items.sort_by_key(|s| {
            std::cmp::Reverse(
                s.last_message
                    .as_ref()
                    .map_or(s.created_at, |m| m.created_at),
            )
        });
        Ok(items)
    }

    async fn add_message(&self, new: NewMessage) -> Result<Message, StoreError> {
        let mut t = self.tables.write().await;
        if !t.conversations.iter().any(|c| c.id == new.conversation_id) {
            return Err(StoreError::not_found("conversation", new.conversation_id));
        }

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: new.conversation_id,
            sender_id: Some(new.sender_id),
            body: new.body,
            gif_url: new.gif_url,
            created_at: Utc::now(),
        };
        t.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        page: Pagination,
    ) -> Result<Paginated<Message>, StoreError> {
        let t = self.tables.read().await;
        let items: Vec<Message> = t
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        Ok(page.apply(&items))
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        _now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut t = self.tables.write().await;
        let unread: Vec<Uuid> = t
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .filter(|m| m.sender_id != Some(user_id))
            .map(|m| m.id)
            .filter(|id| !t.reads.contains(&(*id, user_id)))
            .collect();
        let count = unread.len() as u64;
        t.reads.extend(unread.into_iter().map(|id| (id, user_id)));
        Ok(count)
    }
}

#[async_trait]
impl FeedbackStore for MemoryStore {
    async fn create_feedback(&self, new: NewFeedback) -> Result<Feedback, StoreError> {
        let feedback = Feedback {
            id: Uuid::new_v4(),
            community_id: new.community_id,
            user_id: Some(new.user_id),
            category: new.category,
            message: new.message,
            rating: new.rating,
            sentiment: new.sentiment,
            sentiment_score: new.sentiment_score,
            created_at: Utc::now(),
        };
        self.tables.write().await.feedback.push(feedback.clone());
        Ok(feedback)
    }

    async fn list_feedback(
        &self,
        community_id: Uuid,
        page: Pagination,
    ) -> Result<Paginated<Feedback>, StoreError> {
        let t = self.tables.read().await;
        let items: Vec<Feedback> = t
            .feedback
            .iter()
            .rev()
            .filter(|f| f.community_id == community_id)
            .cloned()
            .collect();
        Ok(page.apply(&items))
    }
}

#[async_trait]
impl AnalysisCacheStore for MemoryStore {
    async fn cached_analysis(
        &self,
        kind: AnalysisKind,
        text_hash: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .analysis
            .get(&(kind, text_hash.to_owned()))
            .cloned())
    }

    async fn store_analysis(
        &self,
        kind: AnalysisKind,
        text_hash: &str,
        result: &serde_json::Value,
    ) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .analysis
            .insert((kind, text_hash.to_owned()), result.clone());
        Ok(())
    }
}
