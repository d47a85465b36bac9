// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket events of the arena.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::store::ArenaStore;
use crate::dispatch::{EventContext, EventRouter, EventRouterBuilder, Reply};
use crate::hub::Hub;
use crate::protocol::OutboundEvent;

pub const VOTE: &str = "vote";
pub const RETRACT_VOTE: &str = "retract_vote";
pub const ADD_STORY: &str = "add_story";
pub const ACTIVATE_STORY: &str = "activate_story";
pub const END_VOTING: &str = "end_voting";
pub const FINALIZE_STORY: &str = "finalize_story";
pub const PROMOTE_FACILITATOR: &str = "promote_facilitator";
pub const DEMOTE_FACILITATOR: &str = "demote_facilitator";
pub const ABANDON_BATTLE: &str = "abandon_battle";

pub const VOTE_ACTIVITY: &str = "vote_activity";
pub const VOTE_RETRACTED: &str = "vote_retracted";
pub const STORY_ADDED: &str = "story_added";
pub const STORY_ACTIVATED: &str = "story_activated";
pub const VOTING_ENDED: &str = "voting_ended";
pub const STORY_FINALIZED: &str = "story_finalized";
pub const FACILITATORS_UPDATED: &str = "facilitators_updated";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoryRef {
    story_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Points {
    story_id: String,
    points: String,
}

#[derive(Debug, Deserialize)]
struct NewStory {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRef {
    user_id: String,
}

/// Decode an event value.
fn bind<T: DeserializeOwned>(value: &str) -> anyhow::Result<T> {
    serde_json::from_str(value).map_err(|e| anyhow::anyhow!("invalid event value: {e}"))
}

/// Register `kind` with a handler that gets the store. `facilitator` gates it.
fn handle<F, Fut>(
    builder: EventRouterBuilder,
    store: &Arc<ArenaStore>,
    kind: &str,
    facilitator: bool,
    handler: F,
) -> EventRouterBuilder
where
    F: Fn(Arc<ArenaStore>, EventContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Reply>> + Send + 'static,
{
    let store = Arc::clone(store);
    let handler = move |ctx: EventContext| handler(Arc::clone(&store), ctx);
    if facilitator {
        builder.facilitator_only(kind, handler)
    } else {
        builder.on(kind, handler)
    }
}

fn broadcast(kind: &str, value: String, ctx: &EventContext) -> anyhow::Result<Reply> {
    Ok(Reply::Broadcast(OutboundEvent::new(kind, value, &ctx.user_id)))
}

/// Event table for the arena hub.
pub fn build_router(hub: Hub, store: Arc<ArenaStore>) -> Arc<EventRouter> {
    let confirm = Arc::clone(&store);
    let retreat = Arc::clone(&store);
    let mut builder = EventRouter::builder(hub)
        .confirm_facilitator(move |room: String, user: String| {
            let store = Arc::clone(&confirm);
            async move { store.confirm_facilitator(&room, &user).await }
        })
        .retreat_user(move |room: String, user: String| {
            let store = Arc::clone(&retreat);
            async move { store.retreat(&room, &user).await }
        });

    builder = handle(builder, &store, VOTE, false, |store, ctx| async move {
        let Points { story_id, points } = bind(&ctx.value)?;
        let stories = store.vote(&ctx.room_id, &ctx.user_id, &story_id, &points).await?;
        broadcast(VOTE_ACTIVITY, stories, &ctx)
    });
    builder = handle(builder, &store, RETRACT_VOTE, false, |store, ctx| async move {
        let StoryRef { story_id } = bind(&ctx.value)?;
        let stories = store.retract_vote(&ctx.room_id, &ctx.user_id, &story_id).await?;
        broadcast(VOTE_RETRACTED, stories, &ctx)
    });
    builder = handle(builder, &store, ADD_STORY, true, |store, ctx| async move {
        let NewStory { name } = bind(&ctx.value)?;
        let stories = store.add_story(&ctx.room_id, &name).await?;
        broadcast(STORY_ADDED, stories, &ctx)
    });
    builder = handle(builder, &store, ACTIVATE_STORY, true, |store, ctx| async move {
        let StoryRef { story_id } = bind(&ctx.value)?;
        let battle = store.activate_story(&ctx.room_id, &story_id).await?;
        broadcast(STORY_ACTIVATED, battle, &ctx)
    });
    builder = handle(builder, &store, END_VOTING, true, |store, ctx| async move {
        let StoryRef { story_id } = bind(&ctx.value)?;
        let stories = store.end_voting(&ctx.room_id, &story_id).await?;
        broadcast(VOTING_ENDED, stories, &ctx)
    });
    builder = handle(builder, &store, FINALIZE_STORY, true, |store, ctx| async move {
        let Points { story_id, points } = bind(&ctx.value)?;
        let stories = store.finalize_story(&ctx.room_id, &story_id, &points).await?;
        broadcast(STORY_FINALIZED, stories, &ctx)
    });
    builder = handle(builder, &store, PROMOTE_FACILITATOR, true, |store, ctx| async move {
        let UserRef { user_id } = bind(&ctx.value)?;
        let facilitators = store.promote_facilitator(&ctx.room_id, &user_id).await?;
        broadcast(FACILITATORS_UPDATED, facilitators, &ctx)
    });
    builder = handle(builder, &store, DEMOTE_FACILITATOR, true, |store, ctx| async move {
        let UserRef { user_id } = bind(&ctx.value)?;
        let facilitators = store.demote_facilitator(&ctx.room_id, &user_id).await?;
        broadcast(FACILITATORS_UPDATED, facilitators, &ctx)
    });
    builder = handle(builder, &store, ABANDON_BATTLE, false, |store, ctx| async move {
        store.abandon(&ctx.room_id, &ctx.user_id).await?;
        Ok(Reply::ForceClose)
    });

    builder.build()
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
