// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

async fn battle_with_story(store: &ArenaStore) -> anyhow::Result<(String, String)> {
    let battle = store.create_battle("Sprint 12", "fac", None).await;
    store.join(&battle.id, "fac").await?;
    store.join(&battle.id, "dev").await?;
    let stories: Vec<Story> = serde_json::from_str(&store.add_story(&battle.id, "Login").await?)?;
    let story_id = stories[0].id.clone();
    store.activate_story(&battle.id, &story_id).await?;
    Ok((battle.id, story_id))
}

#[tokio::test]
async fn create_makes_creator_facilitator() -> anyhow::Result<()> {
    let store = ArenaStore::new();
    let battle = store.create_battle("Sprint 12", "fac", Some(String::new())).await;
    assert_eq!(battle.facilitators, vec!["fac"]);
    assert!(!battle.join_code_required);
    assert!(store.exists(&battle.id).await);
    assert!(!store.exists("other").await);
    store.confirm_facilitator(&battle.id, "fac").await?;
    assert!(store.confirm_facilitator(&battle.id, "dev").await.is_err());
    Ok(())
}

#[tokio::test]
async fn snapshot_hides_the_join_code() -> anyhow::Result<()> {
    let store = ArenaStore::new();
    let battle = store.create_battle("Secret", "fac", Some("hunter2".into())).await;
    let snapshot = store.snapshot(&battle.id).await?;
    assert!(!snapshot.contains("hunter2"));
    let value: serde_json::Value = serde_json::from_str(&snapshot)?;
    assert_eq!(value["joinCodeRequired"], true);
    Ok(())
}

#[tokio::test]
async fn join_gate_skips_code_for_returning_members() -> anyhow::Result<()> {
    let store = ArenaStore::new();
    let battle = store.create_battle("Secret", "fac", Some("hunter2".into())).await;

    let gate = store.join_gate(&battle.id, "dev").await?;
    assert!(!gate.already_member);
    assert_eq!(gate.join_code.as_deref(), Some("hunter2"));

    store.join(&battle.id, "dev").await?;
    store.retreat(&battle.id, "dev").await?;
    assert!(store.join_gate(&battle.id, "dev").await?.already_member);
    assert!(store.join_gate("missing", "dev").await.is_err());
    Ok(())
}

#[tokio::test]
async fn join_retreat_and_abandon_track_the_roster() -> anyhow::Result<()> {
    let store = ArenaStore::new();
    let battle = store.create_battle("Sprint", "fac", None).await;

    let roster: Vec<Warrior> = serde_json::from_str(&store.join(&battle.id, "dev").await?)?;
    assert_eq!(roster, vec![Warrior { id: "dev".into(), active: true }]);
    assert!(store.is_active(&battle.id, "dev").await);

    let roster: Vec<Warrior> = serde_json::from_str(&store.retreat(&battle.id, "dev").await?)?;
    assert_eq!(roster, vec![Warrior { id: "dev".into(), active: false }]);
    assert!(!store.is_active(&battle.id, "dev").await);

    store.join(&battle.id, "dev").await?;
    let roster: Vec<Warrior> = serde_json::from_str(&store.abandon(&battle.id, "dev").await?)?;
    assert!(roster.is_empty());

    // Retreating someone who already left still yields the roster.
    assert_eq!(store.retreat(&battle.id, "dev").await?, "[]");
    assert!(store.retreat("missing", "dev").await.is_err());
    Ok(())
}

#[tokio::test]
async fn votes_replace_and_retract() -> anyhow::Result<()> {
    let store = ArenaStore::new();
    let (battle_id, story_id) = battle_with_story(&store).await?;

    store.vote(&battle_id, "dev", &story_id, "3").await?;
    let stories: Vec<Story> =
        serde_json::from_str(&store.vote(&battle_id, "dev", &story_id, "5").await?)?;
    assert_eq!(stories[0].votes, vec![Vote { warrior_id: "dev".into(), points: "5".into() }]);

    let stories: Vec<Story> =
        serde_json::from_str(&store.retract_vote(&battle_id, "dev", &story_id).await?)?;
    assert!(stories[0].votes.is_empty());
    Ok(())
}

#[tokio::test]
async fn invalid_votes_are_rejected() -> anyhow::Result<()> {
    let store = ArenaStore::new();
    let (battle_id, story_id) = battle_with_story(&store).await?;
    for (user, points) in [("stranger", "3"), ("dev", "")] {
        let result = store.vote(&battle_id, user, &story_id, points).await;
        assert!(result.is_err(), "vote by {user:?} with {points:?} was accepted");
    }
    Ok(())
}

#[tokio::test]
async fn ended_voting_rejects_votes_until_finalized() -> anyhow::Result<()> {
    let store = ArenaStore::new();
    let (battle_id, story_id) = battle_with_story(&store).await?;

    store.end_voting(&battle_id, &story_id).await?;
    let err = store.vote(&battle_id, "dev", &story_id, "8").await;
    assert!(err.is_err_and(|e| e.to_string().contains("voting has ended")));

    let stories: Vec<Story> =
        serde_json::from_str(&store.finalize_story(&battle_id, &story_id, "8").await?)?;
    assert_eq!(stories[0].points, "8");
    let battle = store.get(&battle_id).await.ok_or_else(|| anyhow::anyhow!("battle gone"))?;
    assert_eq!(battle.active_story_id, None);
    assert!(!battle.voting_locked);
    Ok(())
}

#[tokio::test]
async fn inactive_story_rejects_votes() -> anyhow::Result<()> {
    let store = ArenaStore::new();
    let (battle_id, _) = battle_with_story(&store).await?;
    let stories: Vec<Story> = serde_json::from_str(&store.add_story(&battle_id, "Logout").await?)?;
    assert!(store.vote(&battle_id, "dev", &stories[1].id, "1").await.is_err());
    assert!(store.activate_story(&battle_id, "no-such-story").await.is_err());
    assert!(store.add_story(&battle_id, "  ").await.is_err());
    Ok(())
}

#[tokio::test]
async fn facilitators_can_be_promoted_and_demoted() -> anyhow::Result<()> {
    let store = ArenaStore::new();
    let battle = store.create_battle("Sprint", "fac", None).await;
    store.join(&battle.id, "dev").await?;

    assert!(store.promote_facilitator(&battle.id, "stranger").await.is_err());
    assert_eq!(store.promote_facilitator(&battle.id, "dev").await?, r#"["fac","dev"]"#);
    store.confirm_facilitator(&battle.id, "dev").await?;

    assert_eq!(store.demote_facilitator(&battle.id, "fac").await?, r#"["dev"]"#);
    assert!(store.demote_facilitator(&battle.id, "dev").await.is_err());
    Ok(())
}
