//! Travel Match CLI
//!
//! Command-line front end for the Travel Match service: sign in, browse and
//! join trips, chat with fellow travellers, and raise SOS alerts.

use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::time::Duration;
use travel_match::app::{App, View};
use travel_match::config::{Config, DEFAULT_MAX_PARTICIPANTS};
use travel_match::model::{
    conversations_for, Credentials, Id, Message, NewTrip, ProfileUpdate, Registration, Trip,
};
use travel_match::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Travel Match - find travel buddies, chat, stay safe
#[derive(Parser)]
#[command(name = "travel-match")]
#[command(about = "Travel Match client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in
    Login {
        email: String,

        #[arg(long)]
        password: String,
    },

    /// Create an account (verification code required)
    Register {
        /// Full name
        #[arg(long)]
        name: String,

        email: String,

        #[arg(long)]
        password: String,

        #[arg(long, default_value = "")]
        phone: String,

        /// Verification code (prompted for when omitted)
        #[arg(long)]
        otp: Option<String>,
    },

    /// Sign out and forget the stored token
    Logout,

    /// Show the signed-in user
    Whoami,

    /// List trips
    Trips {
        /// Only trips you take part in
        #[arg(long)]
        mine: bool,
    },

    /// Create a trip
    CreateTrip {
        title: String,

        destination: String,

        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long, default_value_t = DEFAULT_MAX_PARTICIPANTS)]
        max: u32,
    },

    /// Join a trip
    JoinTrip { trip_id: String },

    /// Show a trip's conversation
    Chat {
        trip_id: String,

        /// Send a message first
        #[arg(long)]
        send: Option<String>,

        /// Keep polling and print new messages (Ctrl+C to stop)
        #[arg(long)]
        watch: bool,
    },

    /// Raise an emergency SOS alert
    Sos {
        #[arg(long)]
        location: Option<String>,

        #[arg(long)]
        message: Option<String>,
    },

    /// Show your profile
    Profile,

    /// Update your profile
    UpdateProfile {
        #[arg(long)]
        bio: Option<String>,

        #[arg(long)]
        location: Option<String>,

        /// Comma-separated list
        #[arg(long)]
        interests: Option<String>,

        #[arg(long)]
        emergency_contact: Option<String>,
    },

    /// Show your tourist ID
    TouristId,

    /// Authority dashboard stats
    Dashboard,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::default();

    if let Err(e) = run(cli.command, &config).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: &Config) -> Result<()> {
    let mut app = App::connect(config)?;

    match command {
        Commands::Login { email, password } => cmd_login(&mut app, email, password).await,
        Commands::Register {
            name,
            email,
            password,
            phone,
            otp,
        } => {
            let registration = Registration {
                name,
                email,
                password,
                phone,
            };
            cmd_register(&mut app, registration, otp).await
        }
        Commands::Logout => cmd_logout(&mut app).await,
        Commands::Whoami => cmd_whoami(&mut app).await,
        Commands::Trips { mine } => cmd_trips(&mut app, mine).await,
        Commands::CreateTrip {
            title,
            destination,
            start,
            end,
            description,
            max,
        } => {
            let trip = NewTrip {
                title,
                destination,
                start_date: start,
                end_date: end,
                description,
                max_participants: max,
            };
            cmd_create_trip(&mut app, trip).await
        }
        Commands::JoinTrip { trip_id } => cmd_join_trip(&mut app, Id::from(trip_id)).await,
        Commands::Chat {
            trip_id,
            send,
            watch,
        } => cmd_chat(&mut app, config, Id::from(trip_id), send, watch).await,
        Commands::Sos { location, message } => cmd_sos(&mut app, location, message).await,
        Commands::Profile => cmd_profile(&mut app).await,
        Commands::UpdateProfile {
            bio,
            location,
            interests,
            emergency_contact,
        } => cmd_update_profile(&mut app, bio, location, interests, emergency_contact).await,
        Commands::TouristId => cmd_tourist_id(&mut app).await,
        Commands::Dashboard => cmd_dashboard(&app).await,
    }
}

// ============================================================================
// CLI Commands
// ============================================================================

async fn cmd_login(app: &mut App, email: String, password: String) -> Result<()> {
    if app.start().await {
        if let Some(session) = app.session().session() {
            println!("Already signed in as {}", session.display_name);
        }
        return Ok(());
    }

    let session = app
        .session_mut()
        .login(&Credentials::new(email, password))
        .await?;
    println!("Signed in as {} ({})", session.display_name, session.email);
    Ok(())
}

async fn cmd_register(app: &mut App, registration: Registration, otp: Option<String>) -> Result<()> {
    if app.start().await {
        println!("Already signed in; run `travel-match logout` first");
        return Ok(());
    }

    let pending = app.session_mut().register(&registration).await?;
    println!("Verification code sent for {}", pending.email);

    let code = match otp {
        Some(code) => code,
        None => prompt("Enter verification code: ")?,
    };

    let session = app.session_mut().verify_otp(&code).await?;
    println!("Welcome, {}!", session.display_name);
    Ok(())
}

async fn cmd_logout(app: &mut App) -> Result<()> {
    app.start().await;
    app.logout();
    println!("Signed out");
    Ok(())
}

async fn cmd_whoami(app: &mut App) -> Result<()> {
    if !app.start().await {
        println!("Not signed in");
        return Ok(());
    }

    if let Some(session) = app.session().session() {
        println!("{} <{}>", session.display_name, session.email);
        println!("  id:       {}", session.user_id);
        println!("  verified: {}", yes_no(session.verified));
        println!("  profile:  {}", if session.profile_complete { "complete" } else { "incomplete" });
    }
    Ok(())
}

async fn cmd_trips(app: &mut App, mine: bool) -> Result<()> {
    app.start().await;

    let me = app.session().session().map(|s| s.user_id.clone());
    let mut trips = app.trips().await?;
    if let (true, Some(user_id)) = (mine, me.as_ref()) {
        trips = conversations_for(&trips, user_id);
    }

    if trips.is_empty() {
        println!("No trips yet");
        return Ok(());
    }

    for trip in &trips {
        print_trip(trip, me.as_ref());
    }
    Ok(())
}

async fn cmd_create_trip(app: &mut App, trip: NewTrip) -> Result<()> {
    app.start().await;
    let created = app.create_trip(&trip).await?;
    match created.trip_id {
        Some(id) => println!("Created trip {} ({})", trip.title, id),
        None => println!("Created trip {}", trip.title),
    }
    Ok(())
}

async fn cmd_join_trip(app: &mut App, trip_id: Id) -> Result<()> {
    app.start().await;
    app.join_trip(&trip_id).await?;
    println!("Joined trip {}", trip_id);
    Ok(())
}

async fn cmd_chat(
    app: &mut App,
    config: &Config,
    trip_id: Id,
    send: Option<String>,
    watch: bool,
) -> Result<()> {
    app.start().await;
    let me = app
        .session()
        .session()
        .map(|s| s.user_id.clone())
        .ok_or(Error::NotAuthenticated)?;

    let mut rx = app.sync().subscribe();
    app.select_conversation(trip_id.clone());

    if let Some(text) = send {
        app.send_message(&text).await?;
    } else {
        // The poller's first fetch fills the view
        let wait = config.request_timeout() + Duration::from_secs(1);
        let loaded = matches!(
            tokio::time::timeout(wait, rx.wait_for(|v| v.synced)).await,
            Ok(Ok(_))
        );
        if !loaded {
            return Err(Error::Network(format!(
                "could not load messages for trip {}",
                trip_id
            )));
        }
    }

    let mut printed = 0;
    for message in app.sync().messages() {
        print_message(&message, &me);
        printed += 1;
    }
    if printed == 0 {
        println!("No messages yet. Start the conversation!");
    }

    if !watch {
        return Ok(());
    }

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let messages = rx.borrow_and_update().messages.clone();
                if messages.len() < printed {
                    printed = 0;
                }
                for message in &messages[printed..] {
                    print_message(message, &me);
                }
                printed = messages.len();
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    app.navigate(View::Trips);
    Ok(())
}

async fn cmd_sos(app: &mut App, location: Option<String>, message: Option<String>) -> Result<()> {
    app.start().await;
    let receipt = app.sos_mut().send(location, message).await?;

    println!("SOS alert sent");
    println!("  alert id:             {}", receipt.alert_id);
    println!("  nearby users notified: {}", receipt.nearby_users_notified);
    println!("  authorities notified:  {}", yes_no(receipt.authorities_notified));
    println!("Stay calm and remain in a safe location if possible.");
    Ok(())
}

async fn cmd_profile(app: &mut App) -> Result<()> {
    app.start().await;
    let profile = app.profile().await?;

    println!("{} <{}>", profile.name, profile.email);
    println!("  bio:               {}", profile.bio);
    println!("  location:          {}", profile.location);
    println!("  interests:         {}", profile.interests.join(", "));
    println!("  emergency contact: {}", profile.emergency_contact);
    println!("  verified:          {}", yes_no(profile.verified));
    Ok(())
}

async fn cmd_update_profile(
    app: &mut App,
    bio: Option<String>,
    location: Option<String>,
    interests: Option<String>,
    emergency_contact: Option<String>,
) -> Result<()> {
    app.start().await;
    let current = app.profile().await?;

    let mut update = ProfileUpdate::from_profile(&current);
    if let Some(bio) = bio {
        update.bio = bio;
    }
    if let Some(location) = location {
        update.location = location;
    }
    if let Some(interests) = interests {
        update.interests = ProfileUpdate::parse_interests(&interests);
    }
    if let Some(contact) = emergency_contact {
        update.emergency_contact = contact;
    }

    app.session_mut().update_profile(&update).await?;
    println!("Profile updated successfully!");

    if let Some(id) = app.tourist_id().await? {
        println!("Tourist ID: {}", id.id);
    }
    Ok(())
}

async fn cmd_tourist_id(app: &mut App) -> Result<()> {
    app.start().await;
    match app.tourist_id().await? {
        Some(id) => {
            println!("Tourist ID: {}", id.id);
            println!("  blockchain hash: {}", id.blockchain_hash);
            println!("  issued:          {}", id.created_at);
        }
        None => println!("No tourist ID yet - complete your profile to generate one"),
    }
    Ok(())
}

async fn cmd_dashboard(app: &App) -> Result<()> {
    let dashboard = app.dashboard().await?;
    let stats = &dashboard.stats;

    println!("Users:             {}", stats.total_users);
    println!("Trips:             {} ({} active)", stats.total_trips, stats.active_trips);
    println!("Verified tourists: {}", stats.verified_tourists);
    println!("Emergency alerts:  {}", stats.emergency_alerts);

    if !stats.risk_areas.is_empty() {
        println!("\nRisk areas:");
        for area in &stats.risk_areas {
            println!("  {:<20} {}", area.location, area.risk_level);
        }
    }
    if !dashboard.heatmap.is_empty() {
        println!("\nHotspots:");
        for point in &dashboard.heatmap {
            println!("  {:>8.4}, {:>8.4}  intensity {:.1}", point.lat, point.lng, point.intensity);
        }
    }
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn print_trip(trip: &Trip, me: Option<&Id>) {
    let joined = me.is_some_and(|id| trip.has_participant(id));
    let status = if joined {
        "joined"
    } else if trip.is_full() {
        "full"
    } else {
        "open"
    };
    println!("{}  {} -> {} [{}]", trip.id, trip.title, trip.destination, status);
    println!(
        "    {} to {}, {}/{} travellers",
        trip.start_date,
        trip.end_date,
        trip.participants.len(),
        trip.max_participants
    );
    if let Some(creator) = &trip.creator {
        println!("    organised by {}", creator.name);
    }
}

fn format_message(message: &Message, me: &Id) -> String {
    let time = message
        .sent_at()
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| message.timestamp.clone());
    let who = if &message.sender_id == me {
        "you"
    } else {
        message.sender_label()
    };
    format!("[{}] {}: {}", time, who, message.content)
}

fn print_message(message: &Message, me: &Id) {
    println!("{}", format_message(message, me));
}
