//! Wishlist CLI - session table migration and remote list tools.
//!
//! # Usage
//!
//! ```bash
//! # Create the session table in the storefront database
//! wishlist-cli migrate
//!
//! # Show a customer's remote wishlist
//! wishlist-cli wishlist list -c 6104581734514
//!
//! # Add or remove a product on a customer's remote wishlist
//! wishlist-cli wishlist add -c 6104581734514 -p 7
//! wishlist-cli wishlist remove -c 6104581734514 -p gid://shopify/Product/7
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

use commands::wishlist::Action;

#[derive(Parser)]
#[command(name = "wishlist-cli")]
#[command(author, version, about = "Wishlist service CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the session table
    Migrate,
    /// Inspect or edit a customer's remote wishlist
    Wishlist {
        #[command(subcommand)]
        action: WishlistAction,
    },
}

#[derive(Subcommand)]
enum WishlistAction {
    /// Print the customer's list
    List {
        /// Customer ID
        #[arg(short, long)]
        customer: String,
    },
    /// Add a product to the customer's list
    Add {
        /// Customer ID
        #[arg(short, long)]
        customer: String,

        /// Product ID or GID
        #[arg(short, long)]
        product: String,
    },
    /// Remove a product from the customer's list
    Remove {
        /// Customer ID
        #[arg(short, long)]
        customer: String,

        /// Product ID or GID
        #[arg(short, long)]
        product: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::sessions().await?,
        Commands::Wishlist { action } => {
            let (action, customer) = match action {
                WishlistAction::List { customer } => (Action::List, customer),
                WishlistAction::Add { customer, product } => (Action::Add(product), customer),
                WishlistAction::Remove { customer, product } => {
                    (Action::Remove(product), customer)
                }
            };
            commands::wishlist::run(&action, &customer).await?;
        }
    }
    Ok(())
}
