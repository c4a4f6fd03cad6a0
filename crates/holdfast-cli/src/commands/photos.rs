use clap::Subcommand;
use holdfast_core::Database;

#[derive(Subcommand)]
pub enum PhotosAction {
    /// List cached photos, oldest first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete every cached photo
    Clear,
}

pub fn run(action: PhotosAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    match action {
        PhotosAction::List { json } => {
            let photos = db.photos()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&photos)?);
            } else if photos.is_empty() {
                println!("No cached photos.");
            } else {
                for photo in &photos {
                    println!("{}  {} bytes", photo.key, photo.data_url_len);
                }
            }
        }
        PhotosAction::Clear => {
            let mut removed = 0;
            for photo in db.photos()? {
                if db.kv_delete(&photo.key)? {
                    removed += 1;
                }
            }
            println!("removed {removed} photo(s)");
        }
    }
    Ok(())
}
