use anyhow::{Context, Result, bail};
use clap::Parser;
use layers::labels::{WordCloudConfig, WordCloudLayer};
use layers::raster::{HeatmapConfig, HeatmapLayer};
use layers::topics::{TopicFrequencyConfig, TopicFrequencyLayer};
use layers::{HasBinning, HasTimeBucket, RenderOutcome};
use streaming::{Connection, HttpTileClient, StreamingConfig, TileSource, channel_address};
use tools::{Cli, Command, HeatmapArgs, LabelArgs, TopicArgs, to_png_buffer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Command::Key(args) = &cli.command {
        println!("{}", args.request_key("heatmap"));
        return Ok(());
    }

    let config = StreamingConfig::from_env();
    let address = channel_address(&cli.origin)?;
    let http = cli
        .tile_base
        .as_deref()
        .map(|base| HttpTileClient::new(base, &config))
        .transpose()?;

    info!(%address, "opening tile channel");
    let connection = Connection::connect(address.clone(), config)
        .await
        .with_context(|| format!("tile channel {address} did not open"))?;
    let source = TileSource::new(connection.requester().clone(), http);

    let result = match cli.command {
        Command::Heatmap(args) => heatmap(&source, args).await,
        Command::Wordcloud(args) => word_cloud(&source, args).await,
        Command::Topics(args) => topics(&source, args).await,
        Command::Key(_) => Ok(()),
    };
    connection.shutdown().await;
    result
}

fn require_drawn<T>(outcome: RenderOutcome<T>) -> Result<T> {
    match outcome {
        RenderOutcome::Drawn { output, .. } => Ok(output),
        RenderOutcome::Aborted => bail!("render abandoned after the value range widened"),
        RenderOutcome::Blank => bail!("tile is blank"),
    }
}

async fn heatmap(source: &TileSource, args: HeatmapArgs) -> Result<()> {
    let tile = &args.tile;
    let mut layer = HeatmapLayer::new(
        1,
        tile.meta("heatmap"),
        HeatmapConfig {
            tile_size: args.tile_size,
            scale: args.scale,
            ..HeatmapConfig::default()
        },
    );
    layer.set_resolution(args.resolution);
    tile.apply(&mut layer);

    let image = require_drawn(layer.draw(source, tile.coord()).await)?;
    to_png_buffer(image)?
        .save(&args.out)
        .with_context(|| format!("writing {}", args.out.display()))?;
    info!(path = %args.out.display(), "heatmap tile written");
    Ok(())
}

async fn word_cloud(source: &TileSource, args: LabelArgs) -> Result<()> {
    let tile = &args.tile;
    let mut layer = WordCloudLayer::new(2, tile.meta("topiccount"), WordCloudConfig::default());
    tile.apply(&mut layer);
    layer.set_highlight(args.highlight.clone());

    let words = require_drawn(layer.draw(source, tile.coord()).await)?;
    if args.html {
        println!("{}", layer.to_html(&words));
    } else {
        println!("{}", serde_json::to_string_pretty(&words)?);
    }
    Ok(())
}

async fn topics(source: &TileSource, args: TopicArgs) -> Result<()> {
    let tile = &args.label.tile;
    let mut layer = TopicFrequencyLayer::new(3, tile.meta("topicfrequency"), TopicFrequencyConfig::default());
    tile.apply(&mut layer);
    if let Some(interval) = &args.interval {
        layer.set_time_interval(interval);
    }
    layer.set_highlight(args.label.highlight.clone());

    let layout = require_drawn(layer.draw(source, tile.coord()).await)?;
    if args.label.html {
        println!("{}", layer.to_html(&layout));
    } else {
        println!("{}", serde_json::to_string_pretty(&layout)?);
    }
    Ok(())
}
