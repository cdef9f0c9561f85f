//! The room directory: capacity-balanced admission, lazy creation, and
//! grace-windowed reclamation of empty rooms. Reclamation runs two ways —
//! a dedicated ~10s delayed check per empty-room event, and a periodic
//! ~30s sweep as a backstop — per `spec.md` §4.3.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::room::{self, Room};

/// How long an empty room is kept around before it becomes eligible for
/// reclamation, per `spec.md` §4.3.
const EMPTY_ROOM_GRACE: Duration = Duration::from_secs(10);
/// Interval of the backstop sweep that reclaims any room past its grace
/// window that the dedicated per-room check missed or raced.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(30);
/// A room above this fill ratio is deprioritised by `find_room` so load
/// spreads across rooms instead of packing one to the brim.
const FILL_RATIO_SOFT_CAP: f64 = 0.8;

struct RoomEntry {
    room: Arc<Mutex<Room>>,
    tick_task: JoinHandle<()>,
    empty_since: Option<Instant>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: String,
    pub player_count: usize,
    pub max_players: usize,
    pub host_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerStats {
    pub room_count: usize,
    pub total_players: usize,
    pub min_rooms: usize,
    pub max_players_per_room: usize,
}

/// Owns every `Room` in the process. All mutation goes through `&self`
/// (the directory mutex, then at most one room's mutex) — no call site
/// ever holds two different rooms' locks at once.
pub struct RoomManager {
    rooms: Mutex<BTreeMap<String, RoomEntry>>,
    config: Config,
    next_auto_id: AtomicU64,
    started_at: Instant,
}

impl RoomManager {
    pub fn new(config: Config) -> Self {
        Self {
            rooms: Mutex::new(BTreeMap::new()),
            config,
            next_auto_id: AtomicU64::new(1),
            started_at: Instant::now(),
        }
    }

    /// Seconds elapsed since the manager (and therefore the process) came
    /// up — the `uptime` field of `GET /health` (`spec.md` §4.4).
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Creates rooms up to `min_rooms`, run once at startup.
    pub async fn ensure_min_rooms(&self) {
        let mut rooms = self.rooms.lock().await;
        while rooms.len() < self.config.min_rooms {
            let id = self.mint_auto_id();
            self.insert_new_room(&mut rooms, id);
        }
    }

    /// Admits a player per `spec.md` §4.3's `findRoom` exactly: a
    /// preferred room is returned only while it **exists and** has spare
    /// capacity (step 1); anything else — the id doesn't exist at all, or
    /// it exists but is full — falls through to the same balanced scoring
    /// used when no room was requested (step 2), minting a fresh,
    /// auto-id room only if every existing room is full (step 3). A
    /// non-existent or typo'd preferred id never itself causes a room to
    /// be created under that id — only [`RoomManager::create_room`] does
    /// that (`spec.md`'s separate `createRoom(customId?)` operation).
    pub async fn join_or_create(&self, requested_room: Option<String>) -> (String, Arc<Mutex<Room>>) {
        let mut rooms = self.rooms.lock().await;

        if let Some(id) = requested_room.as_deref() {
            let existing = rooms.get(id).map(|entry| entry.room.clone());
            if let Some(room) = existing {
                if room.lock().await.has_capacity() {
                    if let Some(entry) = rooms.get_mut(id) {
                        entry.empty_since = None;
                    }
                    return (id.to_string(), room);
                }
            }
            // Missing or full: fall through to balanced admission below.
        }

        let id = self.best_room_id(&rooms).unwrap_or_else(|| self.mint_auto_id());
        if !rooms.contains_key(&id) {
            self.insert_new_room(&mut rooms, id.clone());
        } else if let Some(entry) = rooms.get_mut(&id) {
            entry.empty_since = None;
        }

        let room = rooms.get(&id).expect("just inserted or already present").room.clone();
        (id, room)
    }

    /// `spec.md` §4.3's `createRoom(customId?)`: mints a fresh room under
    /// an explicit id, or an auto-generated `ocean_<n>` id if none is
    /// given. Idempotent if `customId` already names a room. Distinct
    /// from [`RoomManager::join_or_create`], which never creates a room
    /// under a caller-supplied id.
    pub async fn create_room(&self, custom_id: Option<String>) -> (String, Arc<Mutex<Room>>) {
        let mut rooms = self.rooms.lock().await;
        let id = custom_id.unwrap_or_else(|| self.mint_auto_id());
        if !rooms.contains_key(&id) {
            self.insert_new_room(&mut rooms, id.clone());
        }
        let room = rooms.get(&id).expect("just inserted or already present").room.clone();
        (id, room)
    }

    /// Picks the existing, non-full room with the highest admission
    /// score (`spec.md` §4.3's load-balancing example). Ties favour the
    /// lexicographically smallest id for determinism.
    fn best_room_id(&self, rooms: &BTreeMap<String, RoomEntry>) -> Option<String> {
        let mut best: Option<(String, f64)> = None;
        for (id, entry) in rooms.iter() {
            let Ok(room) = entry.room.try_lock() else {
                continue;
            };
            if !room.has_capacity() {
                continue;
            }
            let score = admission_score(room.player_count(), room.max_players);
            drop(room);
            match &best {
                Some((_, best_score)) if *best_score >= score => {}
                _ => best = Some((id.clone(), score)),
            }
        }
        best.map(|(id, _)| id)
    }

    fn insert_new_room(&self, rooms: &mut BTreeMap<String, RoomEntry>, id: String) {
        let room = Arc::new(Mutex::new(Room::new(
            id.clone(),
            self.config.max_players_per_room,
            self.config.tick_rate,
        )));
        let tick_task = tokio::spawn(room::run_tick_loop(room.clone()));
        tracing::info!(room_id = %id, "room created");
        rooms.insert(
            id,
            RoomEntry {
                room,
                tick_task,
                empty_since: None,
            },
        );
    }

    fn mint_auto_id(&self) -> String {
        format!("ocean_{}", self.next_auto_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Called by the connection layer right after a player disconnects,
    /// passing the `Arc` it already holds so a newly-empty room can spawn
    /// its own delayed reclaim check. Marks the room empty (starting its
    /// grace window) if it now has no players; leaves non-empty rooms
    /// untouched. On the transition into "just became empty", spawns the
    /// dedicated ~10s delayed check that `spec.md` §4.3's
    /// `handleEmptyRoom(id)` describes, independent of the periodic
    /// `cleanup` sweep.
    pub async fn note_possibly_empty(manager: &Arc<Self>, id: &str) {
        let newly_empty = {
            let mut rooms = manager.rooms.lock().await;
            let Some(entry) = rooms.get_mut(id) else {
                return;
            };
            let is_empty = entry.room.lock().await.is_empty();
            if is_empty {
                let already_marked = entry.empty_since.is_some();
                entry.empty_since.get_or_insert_with(Instant::now);
                !already_marked
            } else {
                entry.empty_since = None;
                false
            }
        };

        if newly_empty {
            let manager = manager.clone();
            let room_id = id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(EMPTY_ROOM_GRACE).await;
                manager.reclaim_if_still_empty(&room_id).await;
            });
        }
    }

    /// The delayed per-room check spawned by `note_possibly_empty`
    /// (`spec.md` §4.3's `handleEmptyRoom`): destroys the room if it is
    /// still empty after the grace window and doing so would not drop
    /// the directory below `min_rooms`.
    async fn reclaim_if_still_empty(&self, id: &str) {
        let mut rooms = self.rooms.lock().await;
        if rooms.len() <= self.config.min_rooms {
            return;
        }
        let Some(entry) = rooms.get(id) else {
            return;
        };
        let still_empty = entry.room.lock().await.is_empty();
        if !still_empty {
            return;
        }
        if let Some(entry) = rooms.remove(id) {
            entry.tick_task.abort();
            tracing::info!(room_id = %id, "room reclaimed after grace window");
        }
    }

    /// One sweep of the periodic backstop task: destroys every room that
    /// has been empty past the grace window, stopping once only
    /// `min_rooms` remain. Covers rooms whose dedicated delayed check
    /// (spawned from `note_possibly_empty`) never ran — e.g. the process
    /// restarted mid-grace-window.
    pub async fn cleanup(&self) {
        let mut rooms = self.rooms.lock().await;
        let now = Instant::now();

        let reclaimable: Vec<String> = rooms
            .iter()
            .filter(|(_, entry)| {
                entry
                    .empty_since
                    .is_some_and(|since| now.duration_since(since) >= EMPTY_ROOM_GRACE)
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in reclaimable {
            if rooms.len() <= self.config.min_rooms {
                break;
            }
            if let Some(entry) = rooms.remove(&id) {
                entry.tick_task.abort();
                tracing::info!(room_id = %id, "room reclaimed after grace window");
            }
        }
    }

    pub async fn get_stats(&self) -> ManagerStats {
        let rooms = self.rooms.lock().await;
        let mut total_players = 0;
        for entry in rooms.values() {
            total_players += entry.room.lock().await.player_count();
        }
        ManagerStats {
            room_count: rooms.len(),
            total_players,
            min_rooms: self.config.min_rooms,
            max_players_per_room: self.config.max_players_per_room,
        }
    }

    /// Sorted by player count descending, per `spec.md` §4.3.
    pub async fn get_room_list(&self) -> Vec<RoomSummary> {
        let rooms = self.rooms.lock().await;
        let mut out = Vec::with_capacity(rooms.len());
        for (id, entry) in rooms.iter() {
            let room = entry.room.lock().await;
            out.push(RoomSummary {
                id: id.clone(),
                player_count: room.player_count(),
                max_players: room.max_players,
                host_id: room.host_id,
            });
        }
        out.sort_by(|a, b| b.player_count.cmp(&a.player_count));
        out
    }

    /// Graceful shutdown: abort every room's tick task and destroy each
    /// room, dropping every player's outbound sender so its writer task
    /// (and therefore its WebSocket connection) ends (`spec.md` §5, §7).
    pub async fn shutdown(&self) {
        let rooms = self.rooms.lock().await;
        for (id, entry) in rooms.iter() {
            entry.tick_task.abort();
            entry.room.lock().await.destroy();
            tracing::info!(room_id = %id, "room stopped for shutdown");
        }
    }
}

fn admission_score(player_count: usize, max_players: usize) -> f64 {
    let count = player_count as f64;
    if max_players == 0 {
        return count;
    }
    let fill_ratio = count / max_players as f64;
    if fill_ratio > FILL_RATIO_SOFT_CAP {
        count / 2.0
    } else {
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            port: 0,
            max_players_per_room: 10,
            min_rooms: 1,
            tick_rate: 20,
        }
    }

    #[tokio::test]
    async fn ensure_min_rooms_creates_the_floor() {
        let manager = RoomManager::new(Config { min_rooms: 3, ..test_config() });
        manager.ensure_min_rooms().await;
        assert_eq!(manager.get_stats().await.room_count, 3);
    }

    #[tokio::test]
    async fn preferred_room_is_reused_once_it_exists_and_has_capacity() {
        let manager = RoomManager::new(test_config());
        let (created_id, created_room) = manager.create_room(Some("reef".into())).await;
        let (joined_id, joined_room) = manager.join_or_create(Some(created_id.clone())).await;
        assert_eq!(joined_id, created_id);
        assert!(Arc::ptr_eq(&created_room, &joined_room));
    }

    /// spec.md §4.3 step 1 only reuses a preferred room that already
    /// exists; a non-existent id must fall through to balanced admission
    /// rather than minting a room under the caller-supplied name.
    #[tokio::test]
    async fn nonexistent_preferred_room_is_not_created_under_that_id() {
        let manager = RoomManager::new(test_config());
        let (chosen, _) = manager.join_or_create(Some("totally-made-up".into())).await;
        assert_ne!(chosen, "totally-made-up");
        assert_eq!(manager.get_stats().await.room_count, 1);
    }

    /// `spec.md` §8 scenario 6, worked exactly: R1 at 9/10 (fill ratio 0.9
    /// crosses the soft cap, score halves to 4.5), R2 at 7/10 (score 7,
    /// under the cap). A balanced joiner lands in R2.
    #[tokio::test]
    async fn capacity_balanced_admission_penalises_the_room_above_the_fill_soft_cap() {
        let manager = RoomManager::new(Config { max_players_per_room: 10, ..test_config() });
        let (r1_id, r1) = manager.create_room(Some("r1".into())).await;
        let (r2_id, r2) = manager.create_room(Some("r2".into())).await;

        {
            let mut room = r1.lock().await;
            for i in 0..9 {
                let (tx, _rx) = tokio::sync::mpsc::channel(room::OUTBOUND_BUFFER_SIZE);
                room.add_player(&format!("r1-{i}"), tx);
            }
        }
        {
            let mut room = r2.lock().await;
            for i in 0..7 {
                let (tx, _rx) = tokio::sync::mpsc::channel(room::OUTBOUND_BUFFER_SIZE);
                room.add_player(&format!("r2-{i}"), tx);
            }
        }

        assert_eq!(admission_score(9, 10), 4.5);
        assert_eq!(admission_score(7, 10), 7.0);

        let (chosen, _) = manager.join_or_create(None).await;
        assert_eq!(chosen, r2_id);
        assert_ne!(chosen, r1_id);
    }

    #[tokio::test]
    async fn admission_score_prefers_fuller_room_under_soft_cap() {
        let manager = RoomManager::new(test_config());
        let (_, low) = manager.create_room(Some("a".into())).await;
        let (_, high) = manager.create_room(Some("b".into())).await;

        {
            let mut room = high.lock().await;
            let (tx, _rx) = tokio::sync::mpsc::channel(room::OUTBOUND_BUFFER_SIZE);
            room.add_player("p1", tx);
        }
        {
            let mut room = low.lock().await;
            let (tx, _rx) = tokio::sync::mpsc::channel(room::OUTBOUND_BUFFER_SIZE);
            room.add_player("p2", tx.clone());
        }

        // Both rooms now have one player each; without a third room, a
        // fresh balanced join should land in an existing room rather than
        // minting a new one.
        let (chosen, _) = manager.join_or_create(None).await;
        assert!(chosen == "a" || chosen == "b");
    }

    #[tokio::test]
    async fn balanced_join_creates_new_room_when_all_are_full() {
        let manager = RoomManager::new(Config { max_players_per_room: 1, ..test_config() });
        let (full_id, full_room) = manager.create_room(Some("only".into())).await;
        {
            let mut room = full_room.lock().await;
            let (tx, _rx) = tokio::sync::mpsc::channel(room::OUTBOUND_BUFFER_SIZE);
            room.add_player("p1", tx);
        }

        let (chosen, _) = manager.join_or_create(None).await;
        assert_ne!(chosen, full_id);
    }

    #[tokio::test]
    async fn preferred_room_at_capacity_falls_back_to_balanced_admission() {
        let manager = RoomManager::new(Config { max_players_per_room: 1, ..test_config() });
        let (full_id, full_room) = manager.create_room(Some("only".into())).await;
        {
            let mut room = full_room.lock().await;
            let (tx, _rx) = tokio::sync::mpsc::channel(room::OUTBOUND_BUFFER_SIZE);
            room.add_player("p1", tx);
        }

        // A second joiner preferring the now-full room must not be seated
        // there — spec.md §4.3 step 1 requires spare capacity.
        let (chosen, chosen_room) = manager.join_or_create(Some(full_id.clone())).await;
        assert_ne!(chosen, full_id);
        assert!(chosen_room.lock().await.has_capacity());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_room_is_reclaimed_after_grace_window_above_floor() {
        let manager = Arc::new(RoomManager::new(test_config()));
        let (id, room) = manager.create_room(Some("reef".into())).await;
        let (_lagoon_id, _lagoon) = manager.create_room(Some("lagoon".into())).await;
        assert_eq!(manager.get_stats().await.room_count, 2);

        let (tx, _rx) = tokio::sync::mpsc::channel(room::OUTBOUND_BUFFER_SIZE);
        let player_id = { room.lock().await.add_player("p1", tx) };
        { room.lock().await.remove_player(player_id) };
        RoomManager::note_possibly_empty(&manager, &id).await;

        assert_eq!(manager.get_stats().await.room_count, 2, "grace window not yet elapsed");

        tokio::time::advance(EMPTY_ROOM_GRACE + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        assert_eq!(manager.get_stats().await.room_count, 1, "empty room reclaimed, floor kept");
    }

    /// The periodic sweep is an independent backstop: even without the
    /// dedicated delayed check (simulated here by not calling
    /// `note_possibly_empty`, only stamping `empty_since` via it once and
    /// then relying on `cleanup`), rooms past the grace window are
    /// collected and `min_rooms` is still respected.
    #[tokio::test(start_paused = true)]
    async fn cleanup_never_drops_below_min_rooms() {
        let manager = Arc::new(RoomManager::new(Config { min_rooms: 2, ..test_config() }));
        manager.ensure_min_rooms().await;
        let stats = manager.get_stats().await;
        assert_eq!(stats.room_count, 2);

        for id in ["ocean_1", "ocean_2"] {
            RoomManager::note_possibly_empty(&manager, id).await;
        }
        tokio::time::advance(EMPTY_ROOM_GRACE + Duration::from_secs(1)).await;
        manager.cleanup().await;

        assert_eq!(manager.get_stats().await.room_count, 2);
    }

    #[tokio::test]
    async fn room_list_is_sorted_by_player_count_descending() {
        let manager = RoomManager::new(test_config());
        let (quiet_id, _quiet) = manager.create_room(Some("quiet".into())).await;
        let (busy_id, busy) = manager.create_room(Some("busy".into())).await;
        let (medium_id, medium) = manager.create_room(Some("medium".into())).await;

        {
            let mut room = busy.lock().await;
            for i in 0..3 {
                let (tx, _rx) = tokio::sync::mpsc::channel(room::OUTBOUND_BUFFER_SIZE);
                room.add_player(&format!("busy-{i}"), tx);
            }
        }
        {
            let mut room = medium.lock().await;
            let (tx, _rx) = tokio::sync::mpsc::channel(room::OUTBOUND_BUFFER_SIZE);
            room.add_player("medium-0", tx);
        }

        let list = manager.get_room_list().await;
        let ids: Vec<&str> = list.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![busy_id.as_str(), medium_id.as_str(), quiet_id.as_str()]);
        assert!(list.windows(2).all(|w| w[0].player_count >= w[1].player_count));
    }
}
