// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

#![deny(
    clippy::mutable_key_type,
    clippy::map_entry,
    clippy::boxed_local,
    clippy::let_unit_value,
    clippy::redundant_allocation,
    clippy::bool_comparison,
    clippy::bind_instead_of_map,
    clippy::vec_box,
    clippy::while_let_loop,
    clippy::useless_asref,
    clippy::repeat_once,
    clippy::deref_addrof,
    clippy::suspicious_map,
    clippy::arc_with_non_send_sync,
    clippy::single_char_pattern,
    clippy::for_kv_map,
    clippy::let_and_return,
    clippy::iter_nth,
    clippy::iter_cloned_collect,
    clippy::bytes_nth,
    clippy::match_result_ok,
    clippy::cmp_owned,
    clippy::cmp_null,
    clippy::op_ref
)]

mod bootstrap;
mod config;
mod http;
mod poll_loop;

use actix_cors::Cors;
use actix_web::middleware::DefaultHeaders;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use config::LarchConfig;
use nowtrain::broadcast::Broadcaster;
use nowtrain::feeds::odpt::OdptClient;
use nowtrain::id_cleanup::normalize_railway_id;
use nowtrain::reconcile::{ReconcileOptions, Reconciler};
use nowtrain::stats::ReconcileStats;
use nowtrain::vehicle_cache::VehicleCache;
use poll_loop::PollLoop;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = LarchConfig::parse();

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    let service_tz = config.service_tz()?;

    if config.odpt_consumer_key.is_empty() {
        warn!("ODPT_CONSUMER_KEY is empty, upstream requests will likely be rejected");
    }

    println!("Starting larch against {}", config.odpt_base);

    let client = OdptClient::new(
        &config.odpt_base,
        &config.odpt_consumer_key,
        &config.timetable_calendar,
        config.retry_policy(),
    )
    .context("building ODPT client")?;

    let reference = Arc::new(
        bootstrap::load_reference_data(
            &client,
            &config.railways,
            config.gtfs_path.clone(),
            config.station_match_km,
        )
        .await,
    );

    let cache = Arc::new(VehicleCache::new(config.ttl_sec));
    let stats = Arc::new(ReconcileStats::default());
    let broadcaster = Broadcaster::new(Arc::clone(&cache), config.broadcast_config());

    let reconciler = Reconciler::new(
        Arc::clone(&reference),
        ReconcileOptions {
            service_tz,
            prefer_static_over_midpoint: config.prefer_static_over_midpoint,
        },
        Arc::clone(&stats),
    );

    let poll_loop = PollLoop {
        feed: client,
        reconciler,
        cache: Arc::clone(&cache),
        stats: Arc::clone(&stats),
        interval: config.poll_interval(),
        railway: config
            .poll_railway
            .as_deref()
            .map(normalize_railway_id)
            .filter(|railway| !railway.is_empty()),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poll_handle = tokio::spawn(poll_loop.run(shutdown_rx));

    let state = http::AppState {
        cache,
        broadcaster,
        reference,
        stats,
    };

    info!("listening on {}:{}", config.bind_address, config.port);

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(DefaultHeaders::new().add(("Server", "NowTrain")))
            .app_data(web::Data::new(state.clone()))
            .configure(http::config)
    })
    .bind((config.bind_address.as_str(), config.port))
    .with_context(|| format!("binding {}:{}", config.bind_address, config.port))?
    .run()
    .await?;

    shutdown_tx.send(true).ok();
    poll_handle.await.context("poll loop panicked")?;

    Ok(())
}
