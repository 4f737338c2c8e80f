use clap::{App, Arg};

use backend::config::BackendConfig;
use gateway::config::GatewayConfig;
use status::config::StatusConfig;

fn main() {
    let matches = App::new("Config Scaffolder")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Prints a default TOML config for one of the chat services.")
        .arg(
            Arg::with_name("SERVICE")
                .help("Which service's default config to print")
                .required(true)
                .possible_values(&["gateway", "status", "backend"]),
        )
        .get_matches();

    let toml = match matches.value_of("SERVICE").unwrap() {
        "gateway" => serdeconv::to_toml_string(&GatewayConfig::default()),
        "status" => serdeconv::to_toml_string(&StatusConfig::default()),
        "backend" => serdeconv::to_toml_string(&BackendConfig::default()),
        _ => unreachable!("clap enforces possible_values"),
    };

    println!("{}", toml.expect("failed to serialize default config"));
}
