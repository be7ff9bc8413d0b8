use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use engine::{prelude::*, ManualClock, Perks, ScriptTable};
use rand::prelude::*;
use util::{srng, RngExt};

pub const SERVER_NAME: &str = "foserver";

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, help = "Server configuration file (IDM)")]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 1, help = "Simulation seed")]
    seed: u64,

    #[arg(long, default_value_t = 200, help = "Number of ticks to run")]
    ticks: usize,

    #[arg(long, default_value_t = 100, help = "Game milliseconds per tick")]
    tick_ms: i64,

    #[arg(long, default_value_t = 16, help = "Critters per map")]
    critters: usize,

    #[arg(long, default_value_t = 2, help = "Logic worker threads")]
    threads: usize,

    #[arg(long, help = "Start turn-based combat on the first map")]
    combat: bool,

    #[arg(long, help = "Print the effective configuration and exit")]
    dump_config: bool,
}

const ARENA: &str = "
    ##############################
    #............................#
    #..........~~~...............#
    #............................#
    #....#####.........#####.....#
    #....#.................#.....#
    #....#.......^^........#.....#
    #............^^..............#
    #............................#
    #....#.................#.....#
    #....#####.........#####.....#
    #............................#
    #...............~~~..........#
    #............................#
    ##############################
";

fn main() -> anyhow::Result<()> {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_secs()
    .try_init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if args.dump_config {
        println!("{}", idm::to_string(&config)?);
        return Ok(());
    }

    log::info!("{SERVER_NAME}: seed {}", args.seed);

    let clock = Arc::new(ManualClock::default());
    let script = Arc::new(
        ScriptTable::new()
            .record(EventKind::CritterShow)
            .record(EventKind::CritterHide)
            .record(EventKind::MapCritterDead)
            .record(EventKind::TurnBasedBegin)
            .record(EventKind::TurnBasedEnd),
    );
    let r = Runtime::new(config)
        .with_seed(args.seed)
        .with_clock(clock.clone())
        .with_script(script.clone());

    let maps = populate(&r, &args)?;

    if args.combat {
        let map = &maps[0];
        let first = map.npcs(FindType::LIFE, false).into_iter().next();
        map.begin_turn_based(&r, first.as_deref());
    }

    let threads = args.threads.clamp(1, maps.len());
    let per_thread = maps.len().div_ceil(threads);
    let mut shows = 0;
    let mut deaths = 0;

    for tick in 0..args.ticks {
        std::thread::scope(|s| {
            for chunk in maps.chunks(per_thread) {
                let r = &r;
                s.spawn(move || {
                    for map in chunk {
                        let mut rng = srng(&(args.seed, map.id.0, tick));
                        step_map(r, map, &mut rng);
                    }
                    util::release_all();
                });
            }
        });

        clock.advance(args.tick_ms);
        r.tick();

        for e in script.take_log() {
            match e {
                Event::CritterShow { .. } => shows += 1,
                Event::MapCritterDead { critter, .. } => {
                    log::info!("{critter} died");
                    deaths += 1;
                }
                Event::TurnBasedEnd { map } => log::info!("{map}: combat over"),
                _ => {}
            }
        }
    }

    for map in &maps {
        let crs = map.critters(FindType::ALL, false);
        let pairs: usize = crs.iter().map(|cr| cr.visible_ids().len()).sum();
        let t = map.turn_state();
        log::info!(
            "{} ({}): {} critters, {} seen pairs, turn-based {}, round {}, turns {}",
            map.id,
            map.proto.name,
            crs.len(),
            pairs,
            t.on,
            t.round,
            t.whole_turn
        );
    }
    log::info!("{shows} critter sightings, {deaths} deaths");

    Ok(())
}

/// Create the demo maps and fill them with critters.
fn populate(r: &Runtime, args: &Args) -> anyhow::Result<Vec<MapRef>> {
    let mut rng = srng(&args.seed);
    let mut maps = Vec::new();

    for name in ["arena", "yard"] {
        let mut proto = ProtoMap::from_ascii(name, ARENA)
            .with_context(|| format!("building map {name}"))?;
        proto.loop_times[0] = 5_000;
        let map = r.create_map(proto);

        for i in 0..args.critters {
            let kind = if i == 0 {
                CritterKind::Player
            } else {
                CritterKind::Npc
            };
            let cr = r.spawn(
                kind,
                CritterState {
                    dir: rng.gen_range(0..map.layout().dirs()),
                    perception: rng.gen_range(1..=10),
                    agility: rng.gen_range(1..=10),
                    luck: rng.gen_range(1..=10),
                    sequence: rng.gen_range(1..=20),
                    sneak: rng.gen_range(0..=60),
                    max_move_ap: 2,
                    ..Default::default()
                },
            );
            if rng.one_chance_in(4) {
                cr.with_mut(|s| s.perks |= Perks::HIDDEN);
            }
            let size = map.size();
            let pos = ivec2(rng.gen_range(0..size.x), rng.gen_range(0..size.y));
            if !r.transfer(&cr, Some(&map), pos) {
                log::warn!("{}: no room for {}", map.id, cr.id);
                r.remove_critter(cr.id);
            }
        }
        maps.push(map);
    }

    Ok(maps)
}

/// Let the critters on a map act for one tick.
fn step_map(r: &Runtime, map: &Map, rng: &mut impl Rng) {
    if map.is_turn_based() {
        let Some(cr) = map.critter_turn_id().and_then(|id| map.critter(id, true))
        else {
            return;
        };
        let targets = cr.visible_critters(r, FindType::ACTIVE, true);
        if let Some(target) = targets.choose(rng) {
            target.damage(r, rng.gen_range(1..=10), Some(cr.id));
        } else {
            wander(r, map, &cr, rng);
        }
        map.end_critter_turn(r);

        if map.critters(FindType::ACTIVE, false).len() < 2 {
            map.request_end_turn_based();
        }
        return;
    }

    for cr in map.npcs(FindType::LIFE, true) {
        if rng.one_chance_in(3) {
            wander(r, map, &cr, rng);
        }
    }
}

fn wander(r: &Runtime, map: &Map, cr: &Critter, rng: &mut impl Rng) {
    let dir = rng.gen_range(0..map.layout().dirs());
    map.move_critter(r, cr, dir);
}
