// File: loyalty-core/src/services/loyalty_commands.rs
//! Chat-facing loyalty commands: `balance`, `redeem`, `goals`, `contribute`.
//! Each handler takes the already-split argument string and returns the reply
//! line, or `None` when the bot should stay quiet.

use tracing::error;

use loyalty_common::models::Redeem;

use crate::loyalty::LoyaltyManager;
use crate::Error;

/// Points offered by `!contribute` when no amount is given.
const DEFAULT_CONTRIBUTION: i64 = 100;

/// Who sent the command.
#[derive(Debug, Clone)]
pub struct ChatUser {
    pub name: String,
    pub display_name: String,
}

pub async fn handle_loyalty_command(
    engine: &LoyaltyManager,
    command_name: &str,
    user: &ChatUser,
    raw_args: &str,
) -> Result<Option<String>, Error> {
    // Command names come without the leading '!'.
    match command_name.to_lowercase().as_str() {
        "balance" => handle_balance(engine, user).await.map(Some),
        "redeem" => handle_redeem(engine, user, raw_args).await,
        "goals" => handle_goals(engine, user).await.map(Some),
        "contribute" => handle_contribute(engine, user, raw_args).await.map(Some),
        _ => Ok(None),
    }
}

pub async fn handle_balance(engine: &LoyaltyManager, user: &ChatUser) -> Result<String, Error> {
    let balance = engine.get_points(&user.name).await;
    let currency = engine.config().await.currency;
    Ok(format!("{}: You have {} {}!", user.display_name, balance, currency))
}

pub async fn handle_redeem(
    engine: &LoyaltyManager,
    user: &ChatUser,
    raw_args: &str,
) -> Result<Option<String>, Error> {
    let mut parts = raw_args.split_whitespace();
    let Some(reward_id) = parts.next() else {
        return Ok(None);
    };
    let request_text = parts.collect::<Vec<_>>().join(" ");

    let reward = engine.get_reward(reward_id).await;
    if reward.id.is_empty() || !reward.enabled {
        return Ok(None);
    }

    let currency = engine.config().await.currency;
    let redeem = Redeem {
        username: user.name.clone(),
        display_name: user.display_name.clone(),
        when: engine.now(),
        reward: reward.clone(),
        request_text,
    };

    match engine.perform_redeem_checked(redeem).await {
        Ok(()) => {
            let balance = engine.get_points(&user.name).await;
            Ok(Some(format!(
                "{} has redeemed {}! (new balance: {} {})",
                user.display_name, reward.name, balance, currency
            )))
        }
        Err(Error::InsufficientBalance { balance, price }) => Ok(Some(format!(
            "I'm sorry {} but you cannot afford this (have {} {}, need {})",
            user.display_name, balance, currency, price
        ))),
        Err(Error::RedeemInCooldown) => {
            let available_at = engine.get_reward_cooldown(&reward.id).await;
            let wait = (available_at - engine.now()).num_seconds().max(0);
            Ok(Some(format!(
                "{}: That reward is in cooldown (available in {}s)",
                user.display_name, wait
            )))
        }
        Err(e) => {
            error!("error while performing redeem: {:?}", e);
            Err(e)
        }
    }
}

pub async fn handle_goals(engine: &LoyaltyManager, user: &ChatUser) -> Result<String, Error> {
    let goals: Vec<_> = engine.goals().await.into_iter().filter(|g| g.enabled).collect();
    if goals.is_empty() {
        return Ok(format!("{}: There are no active community goals right now :(!", user.display_name));
    }

    let currency = engine.config().await.currency;
    let mut msg = String::from("Current goals: ");
    for goal in goals {
        msg.push_str(&format!(
            "{} ({}/{} {}) [id: {}] | ",
            goal.name, goal.contributed, goal.total_goal, currency, goal.id
        ));
    }
    msg.push_str(" Contribute with <!contribute POINTS GOALID>");
    Ok(msg)
}

/// `!contribute [points] [goal-id]`: defaults to 100 points towards the first
/// enabled goal that isn't reached yet.
pub async fn handle_contribute(
    engine: &LoyaltyManager,
    user: &ChatUser,
    raw_args: &str,
) -> Result<String, Error> {
    let goals: Vec<_> = engine.goals().await.into_iter().filter(|g| g.enabled).collect();
    let mut parts = raw_args.split_whitespace();

    let mut points = DEFAULT_CONTRIBUTION;
    if let Some(raw_points) = parts.next() {
        if let Ok(parsed) = raw_points.parse::<i64>() {
            if parsed <= 0 {
                return Ok(format!("Nice try {} SoBayed", user.display_name));
            }
            points = parsed;
        }
    }

    let selected = match parts.next() {
        Some(goal_id) => match goals.iter().find(|g| g.id == goal_id) {
            Some(g) => g.clone(),
            None => return Ok(format!("{}: I couldn't find that goal ID :(", user.display_name)),
        },
        None => match goals.iter().find(|g| !g.is_reached()) {
            Some(g) => g.clone(),
            None if goals.is_empty() => {
                return Ok(format!("{}: There are no active community goals right now :(!", user.display_name));
            }
            None => {
                return Ok(format!(
                    "{}: All active community goals have been reached already! ShowOfHands",
                    user.display_name
                ));
            }
        },
    };

    let currency = engine.config().await.currency;
    let contributed = match engine.perform_contribution(&selected, &user.name, points).await {
        Ok(amount) => amount,
        Err(Error::GoalAlreadyReached) => {
            return Ok(format!("{}: This goal was already reached! ヾ(•ω•`)o", user.display_name));
        }
        Err(e) => {
            error!("error while contributing to goal: {:?}", e);
            return Err(e);
        }
    };

    if contributed == 0 {
        return Ok(format!("{}: You don't have any {} to contribute!", user.display_name, currency));
    }

    let updated = engine.get_goal(&selected.id).await;
    let mut msg = format!(
        "ShowOfHands {} contributed {} {} to \"{}\"!! Only {} {} left!",
        user.display_name, contributed, currency, updated.name, updated.remaining(), currency
    );
    if updated.is_reached() {
        msg.push_str(&format!(" The community goal \"{}\" was reached! ShowOfHands", updated.name));
    }
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use loyalty_common::models::{Goal, LoyaltyConfig};
    use crate::test_utils::helpers::{reward, TestEnv};

    fn kitty() -> ChatUser {
        ChatUser { name: "kitty".into(), display_name: "Kitty".into() }
    }

    async fn env_with_currency() -> TestEnv {
        let env = TestEnv::new().await;
        env.seed_config(&LoyaltyConfig { enabled: true, currency: "maows".into(), ..Default::default() })
            .await;
        env
    }

    #[tokio::test]
    async fn test_balance_reply() {
        let env = env_with_currency().await;
        env.seed_points("kitty", 42).await;
        let engine = env.start_default().await;

        let reply = handle_loyalty_command(&engine, "Balance", &kitty(), "").await.unwrap();
        assert_eq!(reply.as_deref(), Some("Kitty: You have 42 maows!"));
    }

    #[tokio::test]
    async fn test_redeem_refuses_overdraft() {
        let env = env_with_currency().await;
        env.seed_rewards(&[reward("hydrate", 50, 0)]).await;
        env.seed_points("kitty", 20).await;
        let engine = env.start_default().await;

        let reply = handle_redeem(&engine, &kitty(), "hydrate").await.unwrap().unwrap();
        assert!(reply.contains("cannot afford"), "got: {reply}");
        assert!(engine.queue().await.is_empty());
        assert_eq!(engine.get_points("kitty").await, 20);
    }

    #[tokio::test]
    async fn test_redeem_success_and_cooldown() {
        let env = env_with_currency().await;
        env.seed_rewards(&[reward("hug", 10, 3600)]).await;
        env.seed_points("kitty", 100).await;
        let engine = env.start_default().await;

        let reply = handle_redeem(&engine, &kitty(), "hug right now please").await.unwrap().unwrap();
        assert_eq!(reply, "Kitty has redeemed hug! (new balance: 90 maows)");
        assert_eq!(engine.queue().await[0].request_text, "right now please");

        let reply = handle_redeem(&engine, &kitty(), "hug").await.unwrap().unwrap();
        assert!(reply.contains("in cooldown"), "got: {reply}");
    }

    #[tokio::test]
    async fn test_redeem_ignores_unknown_or_disabled() {
        let env = env_with_currency().await;
        let mut disabled = reward("off", 1, 0);
        disabled.enabled = false;
        env.seed_rewards(&[disabled]).await;
        let engine = env.start_default().await;

        assert!(handle_redeem(&engine, &kitty(), "off").await.unwrap().is_none());
        assert!(handle_redeem(&engine, &kitty(), "nope").await.unwrap().is_none());
        assert!(handle_redeem(&engine, &kitty(), "").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_contribute_defaults_and_messages() {
        let env = env_with_currency().await;
        let done = Goal {
            id: "done".into(),
            name: "Done".into(),
            total_goal: 10,
            contributed: 10,
            contributors: HashMap::from([("seed".to_string(), 10)]),
            enabled: true,
            ..Default::default()
        };
        let open = Goal { id: "mic".into(), name: "Mic".into(), total_goal: 150, enabled: true, ..Default::default() };
        env.seed_goals(&[done, open]).await;
        env.seed_points("kitty", 500).await;
        let engine = env.start_default().await;

        let reply = handle_contribute(&engine, &kitty(), "").await.unwrap();
        assert_eq!(reply, "ShowOfHands Kitty contributed 100 maows to \"Mic\"!! Only 50 maows left!");

        let reply = handle_contribute(&engine, &kitty(), "500 mic").await.unwrap();
        assert!(reply.contains("contributed 50 maows"), "got: {reply}");
        assert!(reply.contains("was reached"), "got: {reply}");

        let reply = handle_contribute(&engine, &kitty(), "").await.unwrap();
        assert!(reply.contains("have been reached already"), "got: {reply}");

        let reply = handle_contribute(&engine, &kitty(), "-5").await.unwrap();
        assert!(reply.starts_with("Nice try"));

        let reply = handle_contribute(&engine, &kitty(), "5 nope").await.unwrap();
        assert!(reply.contains("couldn't find"));

        assert_eq!(engine.get_points("kitty").await, 350);
    }

    #[tokio::test]
    async fn test_goals_listing() {
        let env = env_with_currency().await;
        let engine = env.start_default().await;
        let reply = handle_goals(&engine, &kitty()).await.unwrap();
        assert!(reply.contains("no active community goals"));
    }
}
