//! One game: lobby membership, menu synchronisation, and the hosted engine.
//!
//! Every game runs as its own tokio task. Connections push [`GameCmd`]s into
//! the task; the task owns all game state, ticks the engine on a fixed
//! interval and fans the per-player view streams out to the member sockets.

use crate::lobby::AppState;
use crate::session::frame;
use bytes::Bytes;
use knights_engine::engine::{DungeonSetup, KnightsEngine};
use knights_engine::item::ItemTypeId;
use knights_engine::quest::{Quest, QuestHintManager};
use knights_engine::GameConfig;
use knights_protocol::messages::RosterEntry;
use knights_protocol::types::{VF_GAME_ENDING, VF_IS_ME, VF_SHOW_MSG, VF_VOTE};
use knights_protocol::{
    ClientPlayerInfo, ClientState, GameInput, GameStatus, Menu, MenuItem, Paragraph, PlayerId,
    ServerMessage,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{Receiver, Sender};

/// The commands a connection can send into a game task.
pub enum GameCmd {
    Join {
        player: PlayerId,
        out: Sender<Bytes>,
        observer: bool,
    },
    Leave {
        player: PlayerId,
    },
    /// The connection dropped; like leave, but nothing can be sent back.
    Disconnect {
        player: PlayerId,
    },
    MenuSelection {
        player: PlayerId,
        item: u32,
        choice: i32,
    },
    Ready {
        player: PlayerId,
        ready: bool,
    },
    ObsFlag {
        player: PlayerId,
        observer: bool,
    },
    HouseColour {
        player: PlayerId,
        colour: u32,
    },
    Chat {
        player: PlayerId,
        text: String,
    },
    VoteRestart {
        player: PlayerId,
        vote: bool,
    },
    ReadyToEnd {
        player: PlayerId,
    },
    Input {
        player: PlayerId,
        input: GameInput,
    },
}

/// The classic four house colours, handed out in join order.
const HOUSE_COLOURS: [u32; 4] = [0xcc0000, 0x0000cc, 0x00aa00, 0xcccc00];

/// Menu item indices.
const MENU_MISSION: usize = 0;
const MENU_NUM_GEMS: usize = 1;
const MENU_TIME_LIMIT: usize = 2;

const MISSION_GEMS: i32 = 0;
const MISSION_BOOK: i32 = 1;
const MISSION_ESCAPE: i32 = 2;

struct Member {
    id: PlayerId,
    out: Sender<Bytes>,
    observer: bool,
    ready: bool,
    house_colour: u32,
    voted_restart: bool,
    ready_to_end: bool,
}

struct EngineRun {
    engine: KnightsEngine,
    started: Instant,
    /// Engine slot -> player identity.
    slots: Vec<PlayerId>,
    /// Wall-clock deadline when a time limit is configured.
    deadline: Option<Instant>,
    last_time_broadcast: Instant,
}

pub struct Game {
    name: String,
    state: Arc<AppState>,
    config: Arc<GameConfig>,
    max_players: u16,
    members: Vec<Member>,
    menu: Menu,
    selections: Vec<i32>,
    run: Option<EngineRun>,
}

/// Spawns the task that owns one game.
pub async fn run_game(
    name: String,
    max_players: u16,
    state: Arc<AppState>,
    mut rx: Receiver<GameCmd>,
) {
    let mut game = Game::new(name, max_players, state);
    let mut ticker = tokio::time::interval(Duration::from_millis(50));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            cmd = rx.recv() => {
                match cmd {
                    Some(cmd) => game.handle_cmd(cmd).await,
                    None => break, // server shutting down
                }
            }
            _ = ticker.tick() => game.tick().await,
        }
    }
    tracing::info!(game = game.name, "game task stopped");
}

impl Game {
    fn new(name: String, max_players: u16, state: Arc<AppState>) -> Game {
        let menu = Menu {
            title: "menu_quest_selection".into(),
            items: vec![
                MenuItem::Dropdown {
                    title: "menu_mission".into(),
                    choices: vec![
                        "quest_gems".into(),
                        "quest_book".into(),
                        "quest_escape".into(),
                    ],
                    space_after: true,
                },
                MenuItem::Dropdown {
                    title: "menu_num_gems".into(),
                    choices: vec!["1".into(), "2".into(), "3".into(), "4".into()],
                    space_after: false,
                },
                MenuItem::Numeric {
                    title: "menu_time_limit".into(),
                    digits: 3,
                    suffix: "mins".into(),
                    space_after: true,
                },
            ],
        };
        Game {
            name,
            state,
            config: Arc::new(GameConfig::sample()),
            max_players,
            members: Vec::new(),
            menu,
            selections: vec![MISSION_GEMS, 3, 0],
            run: None,
        }
    }

    fn member(&mut self, player: &PlayerId) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.id == *player)
    }

    fn send_to(&self, member: &Member, msg: &ServerMessage) {
        let _ = member.out.try_send(frame(msg));
    }

    fn broadcast(&self, msg: &ServerMessage) {
        for member in &self.members {
            self.send_to(member, msg);
        }
    }

    fn status(&self) -> GameStatus {
        if self.run.is_some() {
            GameStatus::InProgress
        } else if self.members.iter().any(|m| m.ready) {
            GameStatus::WaitingToStart
        } else {
            GameStatus::SelectingQuest
        }
    }

    async fn publish_info(&self) {
        let num_players = self.members.iter().filter(|m| !m.observer).count() as u32;
        let num_observers = self.members.iter().filter(|m| m.observer).count() as u32;
        self.state
            .publish_game_info(&self.name, num_players, num_observers, self.status())
            .await;
        self.broadcast_player_list();
    }

    /// The per-game player list with scores, pushed whenever membership or
    /// scores could have changed.
    fn broadcast_player_list(&self) {
        let players: Vec<ClientPlayerInfo> = self
            .members
            .iter()
            .map(|m| {
                let (kills, deaths, state) = match &self.run {
                    Some(run) => match run.slots.iter().position(|p| *p == m.id) {
                        Some(slot) => {
                            let p = &run.engine.world.players[slot];
                            let state = if p.eliminated {
                                ClientState::Eliminated
                            } else {
                                ClientState::Normal
                            };
                            (p.kills, p.skulls, state)
                        }
                        None => (0, 0, ClientState::Observer),
                    },
                    None => {
                        let state = if m.observer {
                            ClientState::Observer
                        } else {
                            ClientState::Normal
                        };
                        (0, 0, state)
                    }
                };
                ClientPlayerInfo {
                    id: m.id.clone(),
                    house_colour: m.house_colour,
                    kills,
                    deaths,
                    frags: kills,
                    ping: 0,
                    state,
                }
            })
            .collect();
        self.broadcast(&ServerMessage::PlayerList { players });
    }

    async fn handle_cmd(&mut self, cmd: GameCmd) {
        match cmd {
            GameCmd::Join {
                player,
                out,
                observer,
            } => self.join(player, out, observer).await,
            GameCmd::Leave { player } | GameCmd::Disconnect { player } => {
                self.leave(player).await;
            }
            GameCmd::MenuSelection {
                player,
                item,
                choice,
            } => self.menu_selection(&player, item, choice),
            GameCmd::Ready { player, ready } => {
                if let Some(member) = self.member(&player) {
                    member.ready = ready;
                }
                self.maybe_start().await;
            }
            GameCmd::ObsFlag { player, observer } => {
                if self.run.is_none()
                    && let Some(member) = self.member(&player)
                {
                    member.observer = observer;
                    member.ready = false;
                }
                self.publish_info().await;
                self.state
                    .broadcast_lobby(&ServerMessage::UpdatePlayer {
                        id: player,
                        game: self.name.clone(),
                        obs_flag: observer,
                    })
                    .await;
            }
            GameCmd::HouseColour { player, colour } => {
                if self.run.is_none()
                    && let Some(member) = self.member(&player)
                {
                    member.house_colour = colour & 0xff_ff_ff;
                }
            }
            GameCmd::Chat { player, text } => {
                let observer = self
                    .members
                    .iter()
                    .find(|m| m.id == player)
                    .is_some_and(|m| m.observer);
                // A speaking knight gets a speech bubble for a moment; the
                // next tick's drain carries it out with the chat line.
                if let Some(run) = &mut self.run
                    && let Some(slot) = run.slots.iter().position(|p| *p == player)
                {
                    run.engine.set_speech_bubble(slot, true);
                }
                self.broadcast(&ServerMessage::Chat {
                    from: player,
                    observer,
                    team_only: false,
                    text,
                });
            }
            GameCmd::VoteRestart { player, vote } => self.vote_restart(player, vote).await,
            GameCmd::ReadyToEnd { player } => self.ready_to_end(player).await,
            GameCmd::Input { player, input } => {
                if let Some(run) = &mut self.run
                    && let Some(slot) = run.slots.iter().position(|p| *p == player)
                {
                    run.engine.handle_input(slot, input);
                }
            }
        }
    }

    async fn join(&mut self, player: PlayerId, out: Sender<Bytes>, observer: bool) {
        if self.members.iter().any(|m| m.id == player) {
            let _ = out.try_send(frame(&ServerMessage::JoinDenied {
                reason_key: "already_in_game".into(),
            }));
            return;
        }
        let playing = self.members.iter().filter(|m| !m.observer).count();
        // A running game only accepts observers.
        let observer = observer || self.run.is_some();
        if !observer && self.max_players != 0 && playing >= self.max_players as usize {
            let _ = out.try_send(frame(&ServerMessage::JoinDenied {
                reason_key: "game_full".into(),
            }));
            return;
        }

        let house_colour = HOUSE_COLOURS[self.members.len() % HOUSE_COLOURS.len()];
        let member = Member {
            id: player.clone(),
            out,
            observer,
            ready: false,
            house_colour,
            voted_restart: false,
            ready_to_end: false,
        };

        let roster: Vec<RosterEntry> = self
            .members
            .iter()
            .chain(std::iter::once(&member))
            .filter(|m| !m.observer)
            .map(|m| RosterEntry {
                id: m.id.clone(),
                ready: m.ready,
                house_colour: m.house_colour,
            })
            .collect();
        let observers: Vec<PlayerId> = self
            .members
            .iter()
            .chain(std::iter::once(&member))
            .filter(|m| m.observer)
            .map(|m| m.id.clone())
            .collect();

        self.send_to(
            &member,
            &ServerMessage::JoinAccepted {
                menu: self.menu.clone(),
                my_house_colour: member.house_colour,
                roster,
                observers,
                already_started: self.run.is_some(),
            },
        );
        // Catch the newcomer up on the authoritative selections.
        for item in 0..self.menu.items.len() {
            let msg = self.selection_message(item);
            self.send_to(&member, &msg);
        }
        self.send_to(
            &member,
            &ServerMessage::SetQuestDescription {
                paragraphs: self.quest_description(),
            },
        );

        self.members.push(member);
        self.state
            .broadcast_lobby(&ServerMessage::UpdatePlayer {
                id: player,
                game: self.name.clone(),
                obs_flag: observer,
            })
            .await;
        self.publish_info().await;
    }

    async fn leave(&mut self, player: PlayerId) {
        let Some(at) = self.members.iter().position(|m| m.id == player) else {
            return;
        };
        let member = self.members.remove(at);
        self.send_to(&member, &ServerMessage::LeaveGame);

        // A player abandoning a running game forfeits their knight.
        if let Some(run) = &mut self.run
            && let Some(slot) = run.slots.iter().position(|p| *p == player)
        {
            run.engine.eliminate_player(slot);
        }

        self.state
            .broadcast_lobby(&ServerMessage::UpdatePlayer {
                id: player,
                game: String::new(),
                obs_flag: false,
            })
            .await;
        self.publish_info().await;
        self.maybe_start().await;
    }

    /// The authoritative selection broadcast for one menu item, including
    /// the currently allowed values (a singleton locks the field).
    fn selection_message(&self, item: usize) -> ServerMessage {
        let choice = self.selections[item];
        let allowed = match item {
            // The gem count is locked (singleton set) unless gems are the
            // mission.
            MENU_NUM_GEMS if self.selections[MENU_MISSION] != MISSION_GEMS => vec![choice],
            _ => match &self.menu.items[item] {
                MenuItem::Dropdown { choices, .. } => (0..choices.len() as i32).collect(),
                // Numeric fields are unconstrained beyond their digit count.
                MenuItem::Numeric { .. } => Vec::new(),
            },
        };
        ServerMessage::SetMenuSelection {
            item: item as u32,
            choice,
            allowed,
        }
    }

    fn quest_description(&self) -> Vec<Paragraph> {
        match self.selections[MENU_MISSION] {
            MISSION_GEMS => vec![
                Paragraph::new("quest_descr_gems")
                    .with_param(self.selections[MENU_NUM_GEMS].to_string()),
                Paragraph::new("quest_descr_exit"),
            ],
            MISSION_BOOK => vec![
                Paragraph::new("quest_descr_book"),
                Paragraph::new("quest_descr_exit"),
            ],
            _ => vec![Paragraph::new("quest_descr_escape")],
        }
    }

    fn menu_selection(&mut self, player: &PlayerId, item: u32, choice: i32) {
        if self.run.is_some() {
            return; // menu is frozen once the game runs
        }
        if self.members.iter().any(|m| m.id == *player && m.observer) {
            return;
        }
        let item = item as usize;
        if item >= self.menu.items.len() {
            return;
        }
        let valid = match &self.menu.items[item] {
            MenuItem::Dropdown { choices, .. } => {
                choice >= 0 && (choice as usize) < choices.len()
            }
            MenuItem::Numeric { digits, .. } => {
                choice >= 0 && choice < 10i32.pow(*digits)
            }
        };
        if !valid {
            return;
        }
        self.selections[item] = choice;

        // Broadcast the result, plus any field whose allowed set changed.
        let msg = self.selection_message(item);
        self.broadcast(&msg);
        if item == MENU_MISSION {
            let msg = self.selection_message(MENU_NUM_GEMS);
            self.broadcast(&msg);
        }
        self.broadcast(&ServerMessage::SetQuestDescription {
            paragraphs: self.quest_description(),
        });
    }

    fn quests_for_selection(&self) -> Vec<Quest> {
        match self.selections[MENU_MISSION] {
            MISSION_GEMS => vec![Quest::Retrieve {
                n: (self.selections[MENU_NUM_GEMS] + 1).max(1) as u32,
                itypes: vec![ItemTypeId(1)],
                singular: "gem".into(),
                plural: "gems".into(),
            }],
            MISSION_BOOK => vec![Quest::Destroy {
                books: vec![ItemTypeId(4)],
                wands: vec![ItemTypeId(3)],
            }],
            MISSION_ESCAPE => vec![],
            _ => vec![],
        }
    }

    async fn maybe_start(&mut self) {
        if self.run.is_some() {
            return;
        }
        let playing: Vec<&Member> = self.members.iter().filter(|m| !m.observer).collect();
        if playing.is_empty() || !playing.iter().all(|m| m.ready) {
            return;
        }

        // Load the resource blobs first: a missing or unreadable graphic
        // refuses the whole start, it never degrades into an empty payload.
        let mut graphics: Vec<(u16, Vec<u8>)> = Vec::with_capacity(self.config.graphics.len());
        for (id, name) in self.config.graphics.iter().enumerate().skip(1) {
            let path = format!("gfx/{name}.png");
            match tokio::fs::read(&path).await {
                Ok(contents) => graphics.push((id as u16, contents)),
                Err(err) => {
                    tracing::error!(?err, path, game = self.name, "graphic unreadable, not starting");
                    self.broadcast(&ServerMessage::Announcement {
                        text: Paragraph::new("error_resource_not_found").with_param(name.clone()),
                        is_error: true,
                    });
                    return;
                }
            }
        }

        let slots: Vec<PlayerId> = playing.iter().map(|m| m.id.clone()).collect();
        let player_specs = slots
            .iter()
            .enumerate()
            .map(|(n, id)| (id.clone(), (n % 2) as u8))
            .collect();
        let setup = DungeonSetup::demo(16, 12);
        let mut engine =
            match KnightsEngine::new(self.config.clone(), None, player_specs, &setup) {
                Ok(engine) => engine,
                Err(err) => {
                    tracing::error!(?err, game = self.name, "config rejected, not starting");
                    self.broadcast(&ServerMessage::Announcement {
                        text: Paragraph::new("error_bad_config"),
                        is_error: true,
                    });
                    return;
                }
            };

        let quests = self.quests_for_selection();
        let mut hints = QuestHintManager::default();
        for (i, quest) in quests.iter().enumerate() {
            hints.add_hint(quest.hint(), i as f64, 1.0);
        }
        for slot in 0..engine.num_players() {
            engine.world.players[slot].quests = quests.clone();
        }

        // Resources go out before the start message, so clients never render
        // with a missing graphic.
        for (id, contents) in graphics {
            self.broadcast(&ServerMessage::LoadGraphic { id, contents });
        }
        self.broadcast(&ServerMessage::StartGame {
            num_displays: 1,
            deathmatch: false,
            players: slots.clone(),
            already_started: false,
        });
        for member in self.members.iter().filter(|m| !m.observer) {
            self.send_to(
                member,
                &ServerMessage::SetQuestHints {
                    hints: hints.hint_strings(),
                },
            );
        }

        let minutes = self.selections[MENU_TIME_LIMIT];
        let deadline =
            (minutes > 0).then(|| Instant::now() + Duration::from_secs(minutes as u64 * 60));
        self.run = Some(EngineRun {
            engine,
            started: Instant::now(),
            slots,
            deadline,
            last_time_broadcast: Instant::now(),
        });
        for member in &mut self.members {
            member.voted_restart = false;
            member.ready_to_end = false;
        }
        self.publish_info().await;
        tracing::info!(game = self.name, "game started");
    }

    /// Advances the engine to wall-clock time and flushes the view streams.
    async fn tick(&mut self) {
        let mut time_msg = None;
        let mut out_of_time = false;
        let mut winner_name: Option<PlayerId> = None;
        {
            let Some(run) = &mut self.run else { return };

            let target = run.started.elapsed().as_millis().min(i32::MAX as u128) as i32;
            run.engine.run_until(target);

            for (slot, player) in run.slots.clone().iter().enumerate() {
                let msgs = run.engine.drain_player_messages(slot);
                if msgs.is_empty() {
                    continue;
                }
                if let Some(member) = self.members.iter().find(|m| m.id == *player) {
                    for msg in &msgs {
                        let _ = member.out.try_send(frame(msg));
                    }
                }
            }

            if let Some(deadline) = run.deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if run.last_time_broadcast.elapsed() >= Duration::from_secs(5) {
                    run.last_time_broadcast = Instant::now();
                    time_msg = Some(ServerMessage::SetTimeRemaining {
                        milliseconds: remaining.as_millis().min(i32::MAX as u128) as i32,
                    });
                }
                out_of_time = remaining.is_zero();
            }
            if let Some(slot) = run.engine.winner() {
                winner_name = Some(run.slots[slot].clone());
            }
        }

        if let Some(msg) = time_msg {
            self.broadcast(&msg);
        }
        if let Some(name) = winner_name {
            self.broadcast(&ServerMessage::Announcement {
                text: Paragraph::new("announce_winner").with_param(name.to_string()),
                is_error: false,
            });
            self.end_game().await;
        } else if out_of_time {
            self.broadcast(&ServerMessage::Announcement {
                text: Paragraph::new("announce_time_up"),
                is_error: false,
            });
            self.end_game().await;
        }
    }

    async fn vote_restart(&mut self, player: PlayerId, vote: bool) {
        if self.run.is_none() {
            return;
        }
        let Some(member) = self.member(&player) else {
            return;
        };
        if member.observer {
            return;
        }
        member.voted_restart = vote;

        let playing = self.members.iter().filter(|m| !m.observer).count();
        let votes = self
            .members
            .iter()
            .filter(|m| !m.observer && m.voted_restart)
            .count();
        let needed = playing / 2 + 1;
        let ending = votes >= needed;

        for member in &self.members {
            let mut flags = 0u8;
            if vote {
                flags |= VF_VOTE;
            }
            if member.id == player {
                flags |= VF_IS_ME;
            }
            flags |= VF_SHOW_MSG;
            if ending {
                flags |= VF_GAME_ENDING;
            }
            self.send_to(
                member,
                &ServerMessage::VotedToRestart {
                    id: player.clone(),
                    flags,
                    votes_needed: needed.saturating_sub(votes) as u32,
                },
            );
        }

        if ending {
            self.end_game().await;
        }
    }

    async fn ready_to_end(&mut self, player: PlayerId) {
        if self.run.is_none() {
            return;
        }
        if let Some(member) = self.member(&player) {
            member.ready_to_end = true;
        }
        self.broadcast(&ServerMessage::PlayerIsReadyToEnd { id: player });
        let all_done = self
            .members
            .iter()
            .filter(|m| !m.observer)
            .all(|m| m.ready_to_end);
        if all_done {
            self.end_game().await;
        }
    }

    /// Tears the engine down and returns everyone to the quest menu.
    async fn end_game(&mut self) {
        self.run = None;
        for member in &mut self.members {
            member.ready = false;
            member.voted_restart = false;
            member.ready_to_end = false;
        }
        self.broadcast(&ServerMessage::GotoMenu);
        self.publish_info().await;
        tracing::info!(game = self.name, "game ended, back to menu");
    }
}
