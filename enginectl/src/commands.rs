use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bridge::avatar::Humanizer;
use bridge::{
    AvatarEngineManager, BridgeConfig, EngineDescriptor, EngineManager, EngineRegistry,
    PlayerStyleProfile, SessionState, WorkerEvent,
};
use chess_common::{format_san, from_engine_move, to_engine_move, GamePosition};
use cozy_chess::Move;
use engine::{detect_protocol, AnalysisInfo, DetectedProtocol, Protocol, Score, SearchLimit};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{PositionArgs, SearchArgs};

pub struct AvatarRequest {
    pub rating: Option<u32>,
    pub username: String,
    pub movetime: u64,
    pub seed: Option<u64>,
}

pub async fn detect(config: &BridgeConfig, path: &Path) -> Result<()> {
    let detected = detect_protocol(path, config.detection_timeout).await;
    println!("{}: {}", path.display(), detected);
    Ok(())
}

pub fn list_engines(config: &BridgeConfig) -> Result<()> {
    let registry = EngineRegistry::load(&config.engines_file)?;
    if registry.is_empty() {
        println!("No engines registered in {}", config.engines_file.display());
    }
    for engine in registry.engines() {
        println!("{}\t{}\t{}", engine.name, engine.protocol, engine.path.display());
    }
    Ok(())
}

pub async fn add_engine(
    config: &BridgeConfig,
    name: String,
    path: PathBuf,
    protocol: Option<Protocol>,
) -> Result<()> {
    let protocol = match protocol {
        Some(protocol) => protocol,
        None => detect_or_bail(config, &path).await?,
    };
    let mut registry = EngineRegistry::load(&config.engines_file)?;
    registry.add(EngineDescriptor::new(name.clone(), path, protocol))?;
    registry.save(&config.engines_file)?;
    println!("Registered {} ({})", name, protocol);
    Ok(())
}

pub fn remove_engine(config: &BridgeConfig, name: &str) -> Result<()> {
    let mut registry = EngineRegistry::load(&config.engines_file)?;
    if registry.remove(name).is_none() {
        bail!("No engine named {}", name);
    }
    registry.save(&config.engines_file)?;
    println!("Removed {}", name);
    Ok(())
}

pub async fn best_move(config: BridgeConfig, engine_arg: &str, search: &SearchArgs) -> Result<()> {
    let position = build_position(&search.position)?;
    let limit = search_limit(search);

    let mut manager = EngineManager::load(config.clone())?;
    let name = register(&config, &mut manager, engine_arg).await?;
    let mut rx = manager.subscribe();
    manager.start_engine(&name).await?;

    let outcome = async {
        let engine_name = await_ready(&mut rx).await?;
        tracing::info!("Searching with {}", engine_name);
        manager.get_best_move(position.clone(), limit)?;
        await_move(&mut rx).await
    }
    .await;
    manager.stop_engine().await;

    print_move(&position, outcome?)
}

pub async fn analyze(
    config: BridgeConfig,
    engine_arg: &str,
    search: &SearchArgs,
    multipv: u32,
) -> Result<()> {
    let position = build_position(&search.position)?;
    let limit = search_limit(search);
    let give_up = limit.time + config.session.move_slack;

    let mut manager = EngineManager::load(config.clone())?;
    let name = register(&config, &mut manager, engine_arg).await?;
    let mut rx = manager.subscribe();
    manager.start_engine(&name).await?;

    let outcome = async {
        await_ready(&mut rx).await?;
        let mut state = manager
            .watch_state()
            .context("engine stopped before analysis")?;
        state.mark_unchanged();
        manager.analyze_position(position.clone(), multipv, limit)?;

        let deadline = tokio::time::sleep(give_up);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                biased;

                event = next_event(&mut rx) => match event? {
                    WorkerEvent::Analysis(info) => print_info(&info),
                    WorkerEvent::Error(msg) => tracing::warn!("{}", msg),
                    _ => {}
                },
                changed = state.changed() => {
                    if changed.is_err() || *state.borrow_and_update() != SessionState::Busy {
                        break;
                    }
                }
                _ = &mut deadline => {
                    tracing::warn!("Analysis did not finish within {:?}", give_up);
                    manager.stop_analysis();
                    break;
                }
            }
        }

        while let Ok(event) = rx.try_recv() {
            if let WorkerEvent::Analysis(info) = event {
                print_info(&info);
            }
        }
        Ok::<_, anyhow::Error>(())
    }
    .await;
    manager.stop_engine().await;
    outcome
}

pub async fn avatar_move(
    config: BridgeConfig,
    engine_arg: &str,
    position: &PositionArgs,
    request: AvatarRequest,
) -> Result<()> {
    let position = build_position(position)?;
    let registry = EngineRegistry::load(&config.engines_file)?;
    let descriptor = match registry.get(engine_arg) {
        Some(descriptor) => descriptor.clone(),
        None => descriptor_for_path(&config, engine_arg).await?,
    };

    let profile = request
        .rating
        .map(|rating| PlayerStyleProfile::new(request.username.clone(), rating));
    let rng = match request.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut avatars = AvatarEngineManager::new(config);
    let mut rx = avatars.subscribe();
    avatars
        .start_with(
            &request.username,
            &descriptor,
            Humanizer::with_rng(profile, rng),
            None,
        )
        .await?;

    let outcome = async {
        let avatar = await_ready(&mut rx).await?;
        tracing::info!("{} is thinking", avatar);
        avatars.request_move(position.clone(), Duration::from_millis(request.movetime))?;
        await_move(&mut rx).await
    }
    .await;
    avatars.stop_avatar().await;

    print_move(&position, outcome?)
}

/// Make sure `engine_arg` names a registered engine, registering a path on the fly.
async fn register(config: &BridgeConfig, manager: &mut EngineManager, engine_arg: &str) -> Result<String> {
    if manager.engine(engine_arg).is_some() {
        return Ok(engine_arg.to_string());
    }
    let descriptor = descriptor_for_path(config, engine_arg).await?;
    let name = descriptor.name.clone();
    if manager.engine(&name).is_none() {
        manager.add_engine(descriptor)?;
    }
    Ok(name)
}

async fn descriptor_for_path(config: &BridgeConfig, engine_arg: &str) -> Result<EngineDescriptor> {
    let path = PathBuf::from(engine_arg);
    if !path.exists() {
        bail!("{} is neither a registered engine nor an executable", engine_arg);
    }
    let protocol = detect_or_bail(config, &path).await?;
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| engine_arg.to_string());
    Ok(EngineDescriptor::new(name, path, protocol))
}

async fn detect_or_bail(config: &BridgeConfig, path: &Path) -> Result<Protocol> {
    match detect_protocol(path, config.detection_timeout).await {
        DetectedProtocol::Unknown => bail!("{} does not speak UCI or WinBoard", path.display()),
        detected => detected
            .protocol()
            .context("detected protocol has no session type"),
    }
}

fn build_position(args: &PositionArgs) -> Result<GamePosition> {
    let mut position = match &args.fen {
        Some(fen) => GamePosition::from_fen(fen)?,
        None => GamePosition::default(),
    };
    for text in &args.moves {
        let mv = from_engine_move(position.board(), text)?;
        position.push(mv)?;
    }
    Ok(position)
}

fn search_limit(search: &SearchArgs) -> SearchLimit {
    let limit = SearchLimit::time(Duration::from_millis(search.movetime));
    match search.depth {
        Some(depth) => limit.with_depth(depth),
        None => limit,
    }
}

async fn next_event(rx: &mut broadcast::Receiver<WorkerEvent>) -> Result<WorkerEvent> {
    loop {
        match rx.recv().await {
            Ok(event) => return Ok(event),
            Err(RecvError::Lagged(n)) => tracing::warn!("Skipped {} events", n),
            Err(RecvError::Closed) => bail!("event channel closed"),
        }
    }
}

async fn await_ready(rx: &mut broadcast::Receiver<WorkerEvent>) -> Result<String> {
    loop {
        match next_event(rx).await? {
            WorkerEvent::Ready(name) => return Ok(name),
            WorkerEvent::Error(msg) => bail!(msg),
            _ => {}
        }
    }
}

async fn await_move(rx: &mut broadcast::Receiver<WorkerEvent>) -> Result<Option<Move>> {
    loop {
        match next_event(rx).await? {
            WorkerEvent::MoveReady(mv) => return Ok(mv),
            WorkerEvent::Error(msg) => tracing::warn!("{}", msg),
            _ => {}
        }
    }
}

fn print_move(position: &GamePosition, mv: Option<Move>) -> Result<()> {
    let board = position.board();
    match mv {
        Some(mv) => println!("bestmove {} ({})", to_engine_move(board, mv), format_san(board, mv)?),
        None => println!("bestmove (none)"),
    }
    Ok(())
}

fn print_info(info: &AnalysisInfo) {
    let score = match info.score {
        Some(Score::Centipawns(cp)) => format!("{:+.2}", f64::from(cp) / 100.0),
        Some(Score::Mate(n)) => format!("#{}", n),
        None => "?".to_string(),
    };
    println!(
        "{:>2}. depth {:>2}  {:>7}  {}",
        info.multipv,
        info.depth,
        score,
        info.pv_san.join(" ")
    );
}
