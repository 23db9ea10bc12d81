//! The `darkroom collection` and `darkroom attach` commands.

use clap::{Args, Subcommand};
use darkroom_core::Config;
use serde::Serialize;

/// Arguments for the `collection` command.
#[derive(Args, Debug)]
pub struct CollectionArgs {
    #[command(subcommand)]
    pub command: CollectionCommand,
}

/// Subcommands for collection management.
#[derive(Subcommand, Debug)]
pub enum CollectionCommand {
    /// Create a new collection
    Create {
        name: String,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// List collections with member counts
    List,

    /// Show a collection's images and artifacts
    Show { id: i64 },

    /// Delete a collection, everything it owns and their files
    Delete { id: i64 },
}

/// Arguments for the `attach` command.
#[derive(Args, Debug)]
pub struct AttachArgs {
    /// Collection to add the image to
    #[arg(short, long)]
    pub collection: i64,

    /// Image to add
    #[arg(short, long)]
    pub image: i64,
}

#[derive(Serialize)]
struct Deleted {
    collection_id: i64,
    blobs_removed: usize,
}

#[derive(Serialize)]
struct Attached {
    collection_id: i64,
    source_image_id: i64,
    newly_linked: bool,
}

/// Execute the collection command.
pub async fn execute(args: CollectionArgs, config: Config) -> anyhow::Result<()> {
    let darkroom = super::open(config).await?;

    match args.command {
        CollectionCommand::Create { name, description } => {
            let collection = darkroom
                .create_collection(&name, description.as_deref())
                .await?;
            tracing::info!("Created collection {} ({})", collection.id, collection.name);
            super::print_json(&collection)?;
        }

        CollectionCommand::List => {
            let collections = darkroom.list_collections().await?;
            if collections.is_empty() {
                tracing::info!("No collections yet. Create one with `darkroom collection create`.");
            }
            super::print_json(&collections)?;
        }

        CollectionCommand::Show { id } => {
            let detail = darkroom.get_collection(id).await?;
            super::print_json(&detail)?;
        }

        CollectionCommand::Delete { id } => {
            let blobs_removed = darkroom.delete_collection(id).await?;
            super::print_json(&Deleted {
                collection_id: id,
                blobs_removed,
            })?;
        }
    }

    Ok(())
}

/// Execute the attach command.
pub async fn attach(args: AttachArgs, config: Config) -> anyhow::Result<()> {
    let darkroom = super::open(config).await?;
    let newly_linked = darkroom.attach_image(args.collection, args.image).await?;
    if !newly_linked {
        tracing::info!(
            "Image {} is already in collection {}",
            args.image,
            args.collection
        );
    }
    super::print_json(&Attached {
        collection_id: args.collection,
        source_image_id: args.image,
        newly_linked,
    })
}
