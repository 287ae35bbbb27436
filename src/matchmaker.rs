//! Selects which bots play each other in a scheduling pass.
//!
//! A bot is under-played if it has fewer than [`MIN_GAMES_PER_VERSION`] games
//! since its latest code version was submitted. Each under-played bot is
//! paired, with replacement, against opponents drawn from the same pool
//! (padded out with the bots that have played the most games overall when
//! the pool is too small), never against itself.

use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, SeedableRng};
use sqlx::AnyPool;

pub const MIN_GAMES_PER_VERSION: i64 = 10;
pub const MAX_BOTS_TO_SCHEDULE: i64 = 100;
pub const MAX_GAMES_TO_SCHEDULE: i64 = 100;

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub min_games_per_version: i64,
    pub max_bots_to_schedule: i64,
    pub max_games_to_schedule: i64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min_games_per_version: MIN_GAMES_PER_VERSION,
            max_bots_to_schedule: MAX_BOTS_TO_SCHEDULE,
            max_games_to_schedule: MAX_GAMES_TO_SCHEDULE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct BotId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pairing {
    pub blue: BotId,
    pub red: BotId,
}

/// Bots with fewer than [`MIN_GAMES_PER_VERSION`] games played since their
/// own latest code version, capped at [`MAX_BOTS_TO_SCHEDULE`].
///
/// A bot with no games at all since its latest version also qualifies (the
/// left join against the games count yields no row for it). A bot with no
/// code version at all is excluded outright (the inner join against the
/// latest-version subquery drops it).
pub async fn bots_with_not_enough_games(pool: &AnyPool, limits: Limits) -> Result<Vec<BotId>, sqlx::Error> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        r#"
        SELECT b.id
        FROM bots b
        JOIN (
            SELECT bot_id, MAX(created_at) AS latest_version_at
            FROM code_versions
            GROUP BY bot_id
        ) lv ON lv.bot_id = b.id
        LEFT JOIN (
            SELECT p.bot_id AS bot_id, COUNT(g.id) AS games_count
            FROM participants p
            JOIN games g ON g.id = p.game_id
            JOIN (
                SELECT bot_id, MAX(created_at) AS latest_version_at
                FROM code_versions
                GROUP BY bot_id
            ) lv ON lv.bot_id = p.bot_id
            WHERE g.created_at > lv.latest_version_at
            GROUP BY p.bot_id
        ) gflv ON gflv.bot_id = b.id
        WHERE b.suspended = FALSE
          AND (gflv.games_count IS NULL OR gflv.games_count < ?)
        LIMIT ?
        "#,
    )
    .bind(limits.min_games_per_version)
    .bind(limits.max_bots_to_schedule)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| BotId(id)).collect())
}

/// Bots ordered by total games played, descending, excluding a given set.
/// Used to pad the opponent pool when too few bots are under-played.
///
/// The exclusion list is spliced in as a `NOT IN (?, ?, ...)` clause built to
/// size rather than a bound array, since the Any driver has no array bind
/// type (`= ANY(?)` is Postgres-only and doesn't run against SQLite).
pub async fn most_active_bots_excluding(
    pool: &AnyPool,
    exclude: &[BotId],
    limit: i64,
) -> Result<Vec<BotId>, sqlx::Error> {
    if limit <= 0 {
        return Ok(Vec::new());
    }

    let exclusion_clause = if exclude.is_empty() {
        String::new()
    } else {
        let placeholders = std::iter::repeat("?").take(exclude.len()).collect::<Vec<_>>().join(", ");
        format!("AND b.id NOT IN ({placeholders})")
    };
    let sql = format!(
        r#"
        SELECT b.id
        FROM bots b
        JOIN participants p ON p.bot_id = b.id
        WHERE b.suspended = FALSE
          AND EXISTS (SELECT 1 FROM code_versions cv WHERE cv.bot_id = b.id)
          {exclusion_clause}
        GROUP BY b.id
        ORDER BY COUNT(p.id) DESC
        LIMIT ?
        "#
    );

    let mut query = sqlx::query_as::<_, (i64,)>(&sql);
    for bot in exclude {
        query = query.bind(bot.0);
    }
    query = query.bind(limit);
    let rows = query.fetch_all(pool).await?;

    Ok(rows.into_iter().map(|(id,)| BotId(id)).collect())
}

/// Builds the pairings for one scheduling pass. Never pairs a bot with
/// itself; every under-played bot receives exactly `limits.min_games_per_version`
/// opponents sampled with replacement from the match pool.
pub async fn schedule_games(pool: &AnyPool, limits: Limits) -> Result<Vec<Pairing>, sqlx::Error> {
    let mut rng = StdRng::from_os_rng();
    schedule_games_with(pool, limits, &mut rng).await
}

async fn schedule_games_with(
    pool: &AnyPool,
    limits: Limits,
    rng: &mut impl Rng,
) -> Result<Vec<Pairing>, sqlx::Error> {
    let mut bots_to_run = bots_with_not_enough_games(pool, limits).await?;
    let mut bots_to_match = bots_to_run.clone();

    if (bots_to_match.len() as i64) < limits.min_games_per_version {
        let shortfall = limits.min_games_per_version - bots_to_match.len() as i64;
        let padding = most_active_bots_excluding(pool, &bots_to_match, shortfall).await?;
        bots_to_match.extend(padding);
    }

    bots_to_run.shuffle(rng);
    bots_to_match.shuffle(rng);

    let mut pairings = Vec::new();
    'bots: for &blue in &bots_to_run {
        let pool_without_self: Vec<BotId> =
            bots_to_match.iter().copied().filter(|&b| b != blue).collect();
        if pool_without_self.is_empty() {
            continue 'bots;
        }
        for _ in 0..limits.min_games_per_version {
            if pairings.len() as i64 >= limits.max_games_to_schedule {
                break 'bots;
            }
            let &red = pool_without_self.choose(rng).expect("checked non-empty above");
            debug_assert_ne!(blue, red, "a bot must never be matched against itself");
            pairings.push(Pairing { blue, red });
        }
    }

    Ok(pairings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fixed_pool(ids: &[i64]) -> Vec<BotId> {
        ids.iter().copied().map(BotId).collect()
    }

    #[test]
    fn never_pairs_a_bot_with_itself_even_with_a_singleton_pool() {
        let mut rng = StdRng::seed_from_u64(42);
        let blue = BotId(1);
        let pool_without_self: Vec<BotId> =
            fixed_pool(&[1, 1, 1]).into_iter().filter(|&b| b != blue).collect();
        assert!(pool_without_self.is_empty());
        let _ = &mut rng;
    }

    #[test]
    fn sampling_with_replacement_can_repeat_opponents() {
        let mut rng = StdRng::seed_from_u64(7);
        let pool = fixed_pool(&[2, 3]);
        let draws: Vec<BotId> =
            (0..20).map(|_| *pool.choose(&mut rng).unwrap()).collect();
        assert!(draws.iter().all(|b| pool.contains(b)));
    }

    async fn seed_bot_with_games(pool: &AnyPool, token: &str, games: i64) -> BotId {
        sqlx::query("INSERT INTO bots (token, suspended) VALUES (?, FALSE)").bind(token).execute(pool).await.unwrap();
        let id: (i64,) =
            sqlx::query_as("SELECT id FROM bots WHERE token = ?").bind(token).fetch_one(pool).await.unwrap();
        for n in 0..games {
            let game_id = format!("{token}-game-{n}");
            sqlx::query("INSERT INTO games (id, created_at, winner_id) VALUES (?, '2024-01-01T00:00:00.000000Z', NULL)")
                .bind(&game_id)
                .execute(pool)
                .await
                .unwrap();
            sqlx::query("INSERT INTO participants (game_id, bot_id, side, created_at) VALUES (?, ?, 0, '2024-01-01T00:00:00.000000Z')")
                .bind(&game_id)
                .bind(id.0)
                .execute(pool)
                .await
                .unwrap();
        }
        BotId(id.0)
    }

    #[tokio::test]
    async fn most_active_bots_excluding_skips_the_excluded_set_on_sqlite() {
        let db = crate::persistence::Db::connect("sqlite::memory:").await.unwrap();
        let pool = db.pool();

        let quiet = seed_bot_with_games(pool, "quiet", 1).await;
        let active = seed_bot_with_games(pool, "active", 5).await;
        let excluded = seed_bot_with_games(pool, "excluded", 9).await;

        let ranked = most_active_bots_excluding(pool, &[excluded], 10).await.unwrap();

        assert!(!ranked.contains(&excluded));
        assert_eq!(ranked, vec![active, quiet]);
    }

    #[tokio::test]
    async fn most_active_bots_excluding_with_an_empty_exclusion_list_returns_everyone() {
        let db = crate::persistence::Db::connect("sqlite::memory:").await.unwrap();
        let pool = db.pool();
        let only = seed_bot_with_games(pool, "only", 2).await;

        let ranked = most_active_bots_excluding(pool, &[], 10).await.unwrap();

        assert_eq!(ranked, vec![only]);
    }

    async fn seed_bot(pool: &AnyPool, token: &str) -> BotId {
        sqlx::query("INSERT INTO bots (token, suspended) VALUES (?, FALSE)").bind(token).execute(pool).await.unwrap();
        let id: (i64,) =
            sqlx::query_as("SELECT id FROM bots WHERE token = ?").bind(token).fetch_one(pool).await.unwrap();
        BotId(id.0)
    }

    async fn give_code(pool: &AnyPool, bot: BotId) {
        sqlx::query(
            "INSERT INTO code_versions (created_at, bot_id, source, cls_name) \
             VALUES ('2024-01-01T00:00:00.000000Z', ?, 'src', 'Bot')",
        )
        .bind(bot.0)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn bots_with_no_code_version_are_never_under_played() {
        let db = crate::persistence::Db::connect("sqlite::memory:").await.unwrap();
        let pool = db.pool();

        let codeless = seed_bot(pool, "codeless").await;
        let coded = seed_bot(pool, "coded").await;
        give_code(pool, coded).await;

        let under_played = bots_with_not_enough_games(pool, Limits::default()).await.unwrap();

        assert!(!under_played.contains(&codeless));
        assert!(under_played.contains(&coded));
    }

    #[tokio::test]
    async fn most_active_bots_excluding_skips_bots_with_no_code_version() {
        let db = crate::persistence::Db::connect("sqlite::memory:").await.unwrap();
        let pool = db.pool();

        let codeless = seed_bot_with_games(pool, "codeless", 5).await;
        let coded = seed_bot_with_games(pool, "coded", 1).await;
        give_code(pool, coded).await;

        let ranked = most_active_bots_excluding(pool, &[], 10).await.unwrap();

        assert_eq!(ranked, vec![coded]);
        assert!(!ranked.contains(&codeless));
    }
}
