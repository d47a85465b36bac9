// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory battle persistence.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::transport::ws::JoinGate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warrior {
    pub id: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub warrior_id: String,
    pub points: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub name: String,
    pub votes: Vec<Vote>,
    /// Final estimate; empty until the story is finalized.
    pub points: String,
}

/// One planning-poker room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Battle {
    pub id: String,
    pub name: String,
    pub facilitators: Vec<String>,
    pub warriors: Vec<Warrior>,
    pub stories: Vec<Story>,
    pub active_story_id: Option<String>,
    pub voting_locked: bool,
    pub join_code_required: bool,
    #[serde(skip)]
    pub join_code: Option<String>,
}

impl Battle {
    fn warrior_mut(&mut self, user_id: &str) -> Option<&mut Warrior> {
        self.warriors.iter_mut().find(|w| w.id == user_id)
    }

    fn is_warrior(&self, user_id: &str) -> bool {
        self.warriors.iter().any(|w| w.id == user_id)
    }

    fn story_mut(&mut self, story_id: &str) -> anyhow::Result<&mut Story> {
        self.stories
            .iter_mut()
            .find(|s| s.id == story_id)
            .ok_or_else(|| anyhow::anyhow!("story not found: {story_id}"))
    }

    /// The story currently open for estimation.
    fn voting_story(&mut self, story_id: &str) -> anyhow::Result<&mut Story> {
        if self.active_story_id.as_deref() != Some(story_id) {
            anyhow::bail!("story is not active: {story_id}");
        }
        if self.voting_locked {
            anyhow::bail!("voting has ended");
        }
        self.story_mut(story_id)
    }

    fn roster(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(&self.warriors)?)
    }

    fn stories_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(&self.stories)?)
    }
}

/// Battles keyed by id.
#[derive(Default)]
pub struct ArenaStore {
    battles: RwLock<HashMap<String, Battle>>,
}

impl ArenaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a battle with `creator` as its first facilitator. An empty join
    /// code means the battle is open.
    pub async fn create_battle(
        &self,
        name: &str,
        creator: &str,
        join_code: Option<String>,
    ) -> Battle {
        let join_code = join_code.filter(|code| !code.is_empty());
        let battle = Battle {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_owned(),
            facilitators: vec![creator.to_owned()],
            warriors: Vec::new(),
            stories: Vec::new(),
            active_story_id: None,
            voting_locked: false,
            join_code_required: join_code.is_some(),
            join_code,
        };
        self.battles.write().await.insert(battle.id.clone(), battle.clone());
        battle
    }

    pub async fn get(&self, battle_id: &str) -> Option<Battle> {
        self.battles.read().await.get(battle_id).cloned()
    }

    pub async fn exists(&self, battle_id: &str) -> bool {
        self.battles.read().await.contains_key(battle_id)
    }

    pub async fn snapshot(&self, battle_id: &str) -> anyhow::Result<String> {
        let battles = self.battles.read().await;
        let battle = battles.get(battle_id).ok_or_else(|| not_found(battle_id))?;
        Ok(serde_json::to_string(battle)?)
    }

    /// Whether `user_id` already has a live connection in the battle.
    pub async fn is_active(&self, battle_id: &str, user_id: &str) -> bool {
        self.battles
            .read()
            .await
            .get(battle_id)
            .is_some_and(|b| b.warriors.iter().any(|w| w.id == user_id && w.active))
    }

    pub async fn join_gate(&self, battle_id: &str, user_id: &str) -> anyhow::Result<JoinGate> {
        let battles = self.battles.read().await;
        let battle = battles.get(battle_id).ok_or_else(|| not_found(battle_id))?;
        Ok(JoinGate {
            already_member: battle.is_warrior(user_id),
            join_code: battle.join_code.clone(),
        })
    }

    /// Mark the user active, adding them on first join. Returns the roster.
    pub async fn join(&self, battle_id: &str, user_id: &str) -> anyhow::Result<String> {
        self.update(battle_id, |battle| {
            match battle.warrior_mut(user_id) {
                Some(warrior) => warrior.active = true,
                None => battle.warriors.push(Warrior { id: user_id.to_owned(), active: true }),
            }
            battle.roster()
        })
        .await
    }

    /// Mark the user inactive. Returns the roster.
    pub async fn retreat(&self, battle_id: &str, user_id: &str) -> anyhow::Result<String> {
        self.update(battle_id, |battle| {
            if let Some(warrior) = battle.warrior_mut(user_id) {
                warrior.active = false;
            }
            battle.roster()
        })
        .await
    }

    /// Remove the user from the battle for good. Returns the roster.
    pub async fn abandon(&self, battle_id: &str, user_id: &str) -> anyhow::Result<String> {
        self.update(battle_id, |battle| {
            battle.warriors.retain(|w| w.id != user_id);
            battle.roster()
        })
        .await
    }

    pub async fn confirm_facilitator(&self, battle_id: &str, user_id: &str) -> anyhow::Result<()> {
        let battles = self.battles.read().await;
        let battle = battles.get(battle_id).ok_or_else(|| not_found(battle_id))?;
        if battle.facilitators.iter().any(|f| f == user_id) {
            Ok(())
        } else {
            anyhow::bail!("{user_id} is not a facilitator of {battle_id}")
        }
    }

    /// Append a story. Returns the story list.
    pub async fn add_story(&self, battle_id: &str, name: &str) -> anyhow::Result<String> {
        if name.trim().is_empty() {
            anyhow::bail!("story name is required");
        }
        self.update(battle_id, |battle| {
            battle.stories.push(Story {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.to_owned(),
                votes: Vec::new(),
                points: String::new(),
            });
            battle.stories_json()
        })
        .await
    }

    /// Open a story for voting. Returns the battle snapshot.
    pub async fn activate_story(&self, battle_id: &str, story_id: &str) -> anyhow::Result<String> {
        self.update(battle_id, |battle| {
            battle.story_mut(story_id)?;
            battle.active_story_id = Some(story_id.to_owned());
            battle.voting_locked = false;
            Ok(serde_json::to_string(&*battle)?)
        })
        .await
    }

    /// Record or replace a vote on the active story. Returns the story list.
    pub async fn vote(
        &self,
        battle_id: &str,
        user_id: &str,
        story_id: &str,
        points: &str,
    ) -> anyhow::Result<String> {
        if points.is_empty() {
            anyhow::bail!("points are required");
        }
        self.update(battle_id, |battle| {
            if !battle.is_warrior(user_id) {
                anyhow::bail!("{user_id} has not joined {battle_id}");
            }
            let story = battle.voting_story(story_id)?;
            match story.votes.iter_mut().find(|v| v.warrior_id == user_id) {
                Some(vote) => vote.points = points.to_owned(),
                None => story
                    .votes
                    .push(Vote { warrior_id: user_id.to_owned(), points: points.to_owned() }),
            }
            battle.stories_json()
        })
        .await
    }

    pub async fn retract_vote(
        &self,
        battle_id: &str,
        user_id: &str,
        story_id: &str,
    ) -> anyhow::Result<String> {
        self.update(battle_id, |battle| {
            let story = battle.voting_story(story_id)?;
            story.votes.retain(|v| v.warrior_id != user_id);
            battle.stories_json()
        })
        .await
    }

    /// Lock voting on the active story. Returns the story list.
    pub async fn end_voting(&self, battle_id: &str, story_id: &str) -> anyhow::Result<String> {
        self.update(battle_id, |battle| {
            battle.voting_story(story_id)?;
            battle.voting_locked = true;
            battle.stories_json()
        })
        .await
    }

    /// Set a story's final estimate and close it. Returns the story list.
    pub async fn finalize_story(
        &self,
        battle_id: &str,
        story_id: &str,
        points: &str,
    ) -> anyhow::Result<String> {
        self.update(battle_id, |battle| {
            battle.story_mut(story_id)?.points = points.to_owned();
            if battle.active_story_id.as_deref() == Some(story_id) {
                battle.active_story_id = None;
                battle.voting_locked = false;
            }
            battle.stories_json()
        })
        .await
    }

    /// Returns the facilitator list.
    pub async fn promote_facilitator(
        &self,
        battle_id: &str,
        user_id: &str,
    ) -> anyhow::Result<String> {
        self.update(battle_id, |battle| {
            if !battle.is_warrior(user_id) {
                anyhow::bail!("{user_id} has not joined {battle_id}");
            }
            if !battle.facilitators.iter().any(|f| f == user_id) {
                battle.facilitators.push(user_id.to_owned());
            }
            Ok(serde_json::to_string(&battle.facilitators)?)
        })
        .await
    }

    /// Returns the facilitator list. The last facilitator cannot be demoted.
    pub async fn demote_facilitator(
        &self,
        battle_id: &str,
        user_id: &str,
    ) -> anyhow::Result<String> {
        self.update(battle_id, |battle| {
            if !battle.facilitators.iter().any(|f| f == user_id) {
                anyhow::bail!("{user_id} is not a facilitator of {battle_id}");
            }
            if battle.facilitators.len() == 1 {
                anyhow::bail!("a battle needs at least one facilitator");
            }
            battle.facilitators.retain(|f| f != user_id);
            Ok(serde_json::to_string(&battle.facilitators)?)
        })
        .await
    }

    async fn update<T>(
        &self,
        battle_id: &str,
        f: impl FnOnce(&mut Battle) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let mut battles = self.battles.write().await;
        let battle = battles.get_mut(battle_id).ok_or_else(|| not_found(battle_id))?;
        f(battle)
    }
}

fn not_found(battle_id: &str) -> anyhow::Error {
    anyhow::anyhow!("battle not found: {battle_id}")
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
