use dotenv::dotenv;

use rom_cover_finder::settings::{self, Settings};

mod cli;

#[tokio::main]
async fn main() {
    dotenv().ok();

    let settings_path = match settings::settings_file_path() {
        Ok(path) => path,
        Err(err) => {
            eprintln!("Unable to locate settings: {}", err);
            return;
        }
    };
    println!("Settings file: {}", settings_path.display());

    let settings = match Settings::load_from_file(&settings_path) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{}. Using defaults.", err);
            Settings::default()
        }
    };

    let mut session = cli::Session::new(settings, settings_path);
    if let Err(err) = cli::main(&mut session).await {
        eprintln!("{}", err);
    }
}
