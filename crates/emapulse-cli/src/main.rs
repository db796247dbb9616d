use clap::{CommandFactory, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "emapulse-cli", version, about = "Emapulse CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Label catalog management
    Label {
        #[command(subcommand)]
        action: commands::label::LabelAction,
    },
    /// Journal a label press for a user
    Log {
        /// Label id or name
        label: String,
        /// Acting user id (trusted input; authentication lives upstream)
        #[arg(long)]
        user: String,
    },
    /// Answer a delivered prompt
    Respond {
        /// State id from the notification payload
        state_id: String,
        /// "yes" keeps the episode going, "no" ends it
        answer: String,
    },
    /// Show a user's active episodes and recent journal
    Status {
        /// User id to inspect
        #[arg(long)]
        user: String,
    },
    /// Push subscription management
    Subscribe {
        #[command(subcommand)]
        action: commands::subscribe::SubscribeAction,
    },
    /// Deadline sweep control
    Sweep {
        #[command(subcommand)]
        action: commands::sweep::SweepAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Generate shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Label { action } => commands::label::run(action),
        Commands::Log { label, user } => commands::log::run(&user, &label),
        Commands::Respond { state_id, answer } => commands::respond::run(&state_id, &answer),
        Commands::Status { user } => commands::status::run(&user),
        Commands::Subscribe { action } => commands::subscribe::run(action),
        Commands::Sweep { action } => commands::sweep::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "emapulse-cli",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
