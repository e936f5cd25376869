// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! layercast-plan
//!
//! Resolve a publish config into the encoder sessions it would open.

// stdout is the output channel of this binary.
#![allow(clippy::disallowed_macros)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;

use layercast::{EncoderConfig, PublishConfig, SessionProperties, VideoCodec};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    /// One 1280x720 primary track
    Single,
    /// Full / half / quarter simulcast
    Simulcast,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CodecArg {
    H264,
    Hevc,
}

#[derive(Parser)]
#[command(name = "layercast-plan")]
#[command(author, version, about = "Show the encoder sessions a publish config opens", long_about = None)]
struct Cli {
    /// Publish config file (TOML). Uses --preset when omitted.
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Built-in config to use when no file is given
    #[arg(long, value_enum, default_value = "single")]
    preset: Preset,

    /// Override the configured codec
    #[arg(long, value_enum)]
    codec: Option<CodecArg>,

    /// Override the configured SDP profile-level-id (hex, e.g. 42e01f)
    #[arg(long, value_parser = parse_hex)]
    profile_level_id: Option<u32>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Print the resolved config as TOML instead of the plan
    #[arg(long)]
    dump_config: bool,
}

fn parse_hex(s: &str) -> std::result::Result<u32, String> {
    let digits = s.trim_start_matches("0x");
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid profile-level-id {s:?}: {e}"))
}

#[derive(Serialize)]
struct PlannedSession {
    layer: String,
    encoder: EncoderConfig,
    properties: SessionProperties,
}

fn load_config(cli: &Cli) -> Result<PublishConfig> {
    let mut config = match &cli.config {
        Some(path) => PublishConfig::from_file(path)
            .with_context(|| format!("Failed to load publish config {}", path.display()))?,
        None => match cli.preset {
            Preset::Single => PublishConfig::default(),
            Preset::Simulcast => PublishConfig::simulcast_preset(),
        },
    };

    if let Some(codec) = cli.codec {
        config.codec = match codec {
            CodecArg::H264 => VideoCodec::H264,
            CodecArg::Hevc => VideoCodec::Hevc,
        };
        // The preset's H.264 profile-level-id means nothing to HEVC.
        if cli.profile_level_id.is_none() && config.codec == VideoCodec::Hevc {
            config.profile_level_id = 0;
        }
    }
    if let Some(id) = cli.profile_level_id {
        config.profile_level_id = id;
    }

    config.validate().context("Invalid publish config")?;
    Ok(config)
}

fn plan(config: &PublishConfig) -> Result<Vec<PlannedSession>> {
    Ok(config
        .encoder_configs()?
        .into_iter()
        .map(|encoder| PlannedSession {
            layer: encoder.layer_label(),
            properties: SessionProperties::for_config(&encoder),
            encoder,
        })
        .collect())
}

fn print_text(config: &PublishConfig, sessions: &[PlannedSession]) {
    println!(
        "{} session(s), codec {} ({}), {}",
        sessions.len(),
        config.codec,
        config.codec.mime_type(),
        if config.is_simulcast() {
            "simulcast"
        } else {
            "single track"
        }
    );
    println!();

    for session in sessions {
        let encoder = &session.encoder;
        let props = &session.properties;
        println!("layer {}", session.layer);
        println!("  size:          {}x{}", encoder.width, encoder.height);
        println!("  profile:       {:?}", props.profile_level);
        println!("  bitrate:       {} bps", props.average_bitrate);
        println!("  frame rate:    {} fps", props.expected_frame_rate);
        println!("  keyframe max:  every {} frames", props.max_keyframe_interval);
        println!(
            "  realtime:      {}, reordering: {}",
            props.realtime, props.allow_frame_reordering
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;

    if cli.dump_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let sessions = plan(&config)?;
    tracing::debug!("[Plan] Resolved {} sessions", sessions.len());

    match cli.format {
        OutputFormat::Text => print_text(&config, &sessions),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&sessions)?),
    }

    Ok(())
}
