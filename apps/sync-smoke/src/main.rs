use std::env;

use sync_ws::build_socket_url;

fn main() {
    let ws_url =
        env::var("LARKCHAT_WS_URL").unwrap_or_else(|_| "ws://127.0.0.1:8080/ws".to_owned());
    let room = env::var("LARKCHAT_ROOM_ID").unwrap_or_else(|_| "general".to_owned());
    let token = env::var("LARKCHAT_TOKEN").ok();

    match build_socket_url(&ws_url, token.as_deref(), &room) {
        Ok(url) => {
            println!("Socket endpoint ok: {url}");
            println!("Set LARKCHAT_TOKEN and run larkchat-headless for a live smoke.");
        }
        Err(err) => {
            eprintln!("Endpoint check failed: {err}");
            std::process::exit(1);
        }
    }
}
