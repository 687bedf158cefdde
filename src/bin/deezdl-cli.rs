use clap::{Parser, Subcommand, ValueEnum};
use deezdl::http::RetryPolicy;
use deezdl::{
    Config, DeezerApi, DeezerError, Deezdl, LastFmEnricher, Link, MediaType, TagEnricher,
    TrackOutcome,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "deezdl-cli")]
#[command(about = "Download tracks, albums, artists and playlists from Deezer", long_about = None)]
struct Cli {
    /// Deezer ARL token (can also be set via DEEZER_ARL env var); needed to download
    #[arg(long, env = "DEEZER_ARL", hide_env_values = true)]
    arl: Option<String>,

    /// Output directory for downloads
    #[arg(short, long, default_value = "downloads")]
    output: PathBuf,

    /// Audio quality: 1 = FLAC, 2 = MP3 320, 3 = MP3 256, 4 = MP3 128
    #[arg(short, long, env = "DEEZDL_QUALITY", default_value_t = 2,
          value_parser = clap::value_parser!(u8).range(1..=4))]
    quality: u8,

    /// Naming template for album, artist and track downloads
    #[arg(long, env = "DEEZDL_TEMPLATE")]
    template: Option<String>,

    /// Naming template for playlist downloads
    #[arg(long, env = "DEEZDL_PLAYLIST_TEMPLATE")]
    playlist_template: Option<String>,

    /// Do not embed cover art
    #[arg(long)]
    no_cover: bool,

    /// Save lyrics next to each track
    #[arg(long)]
    lyrics: bool,

    /// Tracks downloaded at once within an album or playlist
    #[arg(short, long, default_value_t = 1)]
    concurrency: usize,

    /// last.fm API key; prints genre tags of downloaded tracks
    #[arg(long, env = "LASTFM_API_KEY", hide_env_values = true)]
    lastfm_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download tracks, albums, artists or playlists
    Download {
        /// URLs or IDs of the content to download
        #[arg(required = true)]
        id_or_url: Vec<String>,

        /// Type of content for bare IDs
        #[arg(short, long, value_enum, default_value_t = ContentType::Track)]
        r#type: ContentType,
    },
    /// Search the catalogue
    Search {
        /// Search query
        query: String,

        /// What to search for
        #[arg(short, long, value_enum, default_value_t = SearchType::Track)]
        r#type: SearchType,

        /// Maximum number of results
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },
    /// Show an artist's most popular tracks
    Top {
        /// Artist URL or ID
        artist: String,

        /// Maximum number of results
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum SearchType {
    Track,
    Album,
    Artist,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum ContentType {
    Track,
    Album,
    Artist,
    Playlist,
}

impl From<ContentType> for MediaType {
    fn from(t: ContentType) -> Self {
        match t {
            ContentType::Track => MediaType::Track,
            ContentType::Album => MediaType::Album,
            ContentType::Artist => MediaType::Artist,
            ContentType::Playlist => MediaType::Playlist,
        }
    }
}

fn resolve(id_or_url: &str, content_type: ContentType) -> Result<Link, DeezerError> {
    if id_or_url.bytes().all(|b| b.is_ascii_digit()) {
        Link::from_id(content_type.into(), id_or_url)
    } else {
        Link::parse(id_or_url)
    }
}

fn config(cli: &Cli) -> Config {
    let mut config = Config::with_arl(cli.arl.clone().unwrap_or_default());
    config.output_dir = cli.output.clone();
    config.quality = cli.quality;
    if let Some(template) = &cli.template {
        config.naming_template = template.clone();
    }
    if let Some(template) = &cli.playlist_template {
        config.playlist_naming_template = template.clone();
    }
    config.embed_cover_art = !cli.no_cover;
    config.fetch_lyrics = cli.lyrics;
    config.concurrency = cli.concurrency;
    config
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("deezdl=info")),
        )
        .init();

    let cli = Cli::parse();
    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("❌ {}", e);
            ExitCode::from(2)
        }
    }
}

/// Returns whether every item ended up on disk, or whether the lookup
/// found anything.
async fn run(cli: &Cli) -> Result<bool, DeezerError> {
    match &cli.command {
        Commands::Download { id_or_url, r#type } => download(cli, id_or_url, *r#type).await,
        Commands::Search {
            query,
            r#type,
            limit,
        } => search(query, *r#type, *limit).await,
        Commands::Top { artist, limit } => top(artist, *limit).await,
    }
}

async fn search(query: &str, search_type: SearchType, limit: u32) -> Result<bool, DeezerError> {
    let api = DeezerApi::new(RetryPolicy::default())?;

    let lines: Vec<String> = match search_type {
        SearchType::Track => api
            .search_tracks(query, limit)
            .await?
            .into_iter()
            .map(|t| format!("{:>12}  {} - {} ({})", t.id, t.artist.name, t.title, t.album.title))
            .collect(),
        SearchType::Album => api
            .search_albums(query, limit)
            .await?
            .into_iter()
            .map(|a| format!("{:>12}  {} - {} [{} tracks]", a.id, a.artist.name, a.title, a.nb_tracks))
            .collect(),
        SearchType::Artist => api
            .search_artists(query, limit)
            .await?
            .into_iter()
            .map(|a| format!("{:>12}  {} ({} albums)", a.id, a.name, a.nb_album))
            .collect(),
    };

    if lines.is_empty() {
        println!("No results for \"{}\"", query);
    }
    for line in &lines {
        println!("{}", line);
    }
    Ok(!lines.is_empty())
}

async fn top(artist: &str, limit: u32) -> Result<bool, DeezerError> {
    let link = resolve(artist, ContentType::Artist)?;
    if link.media_type != MediaType::Artist {
        return Err(DeezerError::InvalidLink(format!("{} is not an artist", link)));
    }

    let api = DeezerApi::new(RetryPolicy::default())?;
    let tracks = api.get_artist_top_tracks(&link.id, limit).await?;
    for (i, t) in tracks.iter().enumerate() {
        println!("{:>2}. {:>12}  {} - {}", i + 1, t.id, t.artist.name, t.title);
    }
    Ok(!tracks.is_empty())
}

async fn download(
    cli: &Cli,
    id_or_url: &[String],
    content_type: ContentType,
) -> Result<bool, DeezerError> {
    let dz = Deezdl::new(config(cli)).await?;

    let cancel = dz.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling, partial files are kept for resume...");
            cancel.cancel();
        }
    });

    let enricher = match &cli.lastfm_key {
        Some(key) => Some(LastFmEnricher::new(key.clone(), dz.config().retry)?),
        None => None,
    };

    let mut all_ok = true;

    for input in id_or_url {
        let link = match resolve(input, content_type) {
            Ok(link) => link,
            Err(e) => {
                eprintln!("❌ {}", e);
                all_ok = false;
                continue;
            }
        };

        println!("Downloading {}...", link);
        let report = dz.download_link(&link).await?;

        for item in &report.items {
            match &item.result {
                Ok(TrackOutcome::Downloaded(track)) => {
                    println!("✅ {} - {} [{}]", track.artist, track.title, track.quality);
                    println!("   Path: {}", track.path.display());
                    if let Some(enricher) = &enricher {
                        if let Some(tags) = enricher.tags(&track.artist, &track.title).await {
                            println!("   Tags: {}", tags.join(", "));
                        }
                    }
                }
                Ok(TrackOutcome::AlreadyExists(stored)) | Ok(TrackOutcome::Cached(stored)) => {
                    println!("⏭  {} - {} already there", stored.artist, stored.title);
                    println!("   Path: {}", stored.path.display());
                }
                Ok(TrackOutcome::Skipped(reason)) => {
                    println!("⚠️  Track {} skipped: {}", item.track_id, reason);
                }
                Err(e) => {
                    println!("❌ Track {} failed: {}", item.track_id, e);
                }
            }
        }

        println!(
            "   Completed: {}/{} (skipped {}, failed {})",
            report.completed(),
            report.total(),
            report.skipped(),
            report.failed()
        );
        all_ok &= report.all_successful();
    }

    Ok(all_ok)
}
