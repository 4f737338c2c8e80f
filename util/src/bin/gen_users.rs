use clap::{App, Arg};
use std::fs;
use std::io::{BufRead, BufReader};

use userstore::{SqliteUserStore, UserStore};

fn main() {
    let matches = App::new("User Provisioner")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Registers users into a gateway's sqlite user store from a username/password list.")
        .arg(
            Arg::with_name("DB_FILE")
                .help("Path to the gateway's sqlite database")
                .required(true),
        )
        .arg(
            Arg::with_name("USER_FILE")
                .help("Path to a file of `username password` pairs, one per line")
                .required(true),
        )
        .arg(
            Arg::with_name("WORKER_ID")
                .help("Snowflake worker id to mint new uids with")
                .required(false)
                .default_value("0"),
        )
        .get_matches();

    let db_path = matches.value_of("DB_FILE").unwrap();
    let user_file_path = matches.value_of("USER_FILE").unwrap();
    let worker_id: u16 = matches
        .value_of("WORKER_ID")
        .unwrap()
        .parse()
        .expect("worker id must be a valid integer");

    let store = SqliteUserStore::open(db_path, 4, worker_id).expect("failed to open user store");

    let file = fs::File::open(user_file_path).expect("failed to open user file");
    let reader = BufReader::new(file);

    let mut registered = 0;
    let mut skipped = 0;

    for line in reader.lines() {
        let line = line.expect("failed to read line");
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut parts = line.splitn(2, ' ');
        let username = parts.next().unwrap_or("");
        let password = parts.next().unwrap_or("");
        if username.is_empty() || password.is_empty() {
            println!("Skipping malformed line: `{}`", line);
            skipped += 1;
            continue;
        }

        match store.register(username, password) {
            Ok(uid) => {
                println!("Registered `{}` as uid {}", username, uid);
                registered += 1;
            }
            Err(e) => {
                println!("Skipping `{}`: {}", username, e);
                skipped += 1;
            }
        }
    }

    println!("Done: {} registered, {} skipped", registered, skipped);
}
