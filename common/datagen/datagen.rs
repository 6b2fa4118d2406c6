//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use clap::App;
use clap::Arg;
use log::info;

pub mod gen {
    use indicatif::ProgressBar;
    use rand::rngs::SmallRng;
    use rand::seq::SliceRandom;
    use rand::Rng;

    pub struct PartyData {
        pub headers: Vec<String>,
        pub rows: Vec<Vec<String>>,
    }

    /// Identifiers `1001..` drawn from a pool; the first `shared` of the
    /// pool are held by every party, the rest are dealt out round robin
    pub fn assign_ids(
        rng: &mut SmallRng,
        parties: usize,
        size: usize,
        shared: usize,
    ) -> Vec<Vec<String>> {
        let shared = shared.min(size);
        let unique = size - shared;
        let pool = (0..shared + unique * parties)
            .map(|i| format!("{}", 1001 + i))
            .collect::<Vec<String>>();

        (0..parties)
            .map(|p| {
                let mut ids = pool[..shared].to_vec();
                ids.extend(
                    pool[shared..]
                        .iter()
                        .skip(p)
                        .step_by(parties)
                        .take(unique)
                        .cloned(),
                );
                ids.shuffle(rng);
                ids
            })
            .collect()
    }

    /// Party 0 carries the label, computed from its own features with noise
    pub fn party_data(
        rng: &mut SmallRng,
        party: usize,
        ids: &[String],
        features: usize,
        logistic: bool,
    ) -> PartyData {
        let mut headers = vec![String::from("user_id")];
        headers.extend((0..features).map(|j| format!("p{}_f{}", party, j)));
        if party == 0 {
            headers.push(String::from(if logistic {
                "will_purchase"
            } else {
                "purchase_amount"
            }));
        }

        let progress_bar = ProgressBar::new(ids.len() as u64);
        let rows = ids
            .iter()
            .map(|id| {
                let x = (0..features)
                    .map(|_| rng.gen_range(0.0..100.0))
                    .collect::<Vec<f64>>();
                let mut row = vec![id.clone()];
                row.extend(x.iter().map(|v| format!("{:.2}", v)));
                if party == 0 {
                    let signal = x
                        .iter()
                        .enumerate()
                        .map(|(j, v)| (j as f64 + 1.0) * v)
                        .sum::<f64>()
                        / features.max(1) as f64;
                    let noisy = signal + rng.gen_range(-5.0..5.0);
                    if logistic {
                        row.push(format!("{}", (noisy > 50.0) as u8));
                    } else {
                        row.push(format!("{:.2}", noisy));
                    }
                }
                progress_bar.inc(1);
                row
            })
            .collect();
        progress_bar.finish();
        PartyData { headers, rows }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    env_logger::init();

    let matches = App::new("Joint regression test data")
        .version("0.1")
        .about("Generates per-party CSV inputs with overlapping user ids")
        .args(&[
            Arg::with_name("dir")
                .short("d")
                .long("dir")
                .value_name("DIR")
                .help("output dir")
                .takes_value(true)
                .default_value("./"),
            Arg::with_name("parties")
                .short("p")
                .long("parties")
                .takes_value(true)
                .default_value("3")
                .help("number of parties"),
            Arg::with_name("size")
                .short("n")
                .long("size")
                .takes_value(true)
                .default_value("250")
                .help("rows per party"),
            Arg::with_name("shared")
                .short("s")
                .long("shared")
                .takes_value(true)
                .default_value("100")
                .help("ids held by every party"),
            Arg::with_name("features")
                .short("c")
                .long("features")
                .takes_value(true)
                .default_value("3")
                .help("feature columns per party"),
            Arg::with_name("regression")
                .short("r")
                .long("regression")
                .takes_value(true)
                .possible_values(&["linear", "logistic"])
                .default_value("linear"),
            Arg::with_name("seed")
                .long("seed")
                .takes_value(true)
                .default_value("42"),
        ])
        .get_matches();

    let parties = matches.value_of("parties").unwrap_or("3").parse::<usize>()?;
    let size = matches.value_of("size").unwrap_or("250").parse::<usize>()?;
    let shared = matches.value_of("shared").unwrap_or("100").parse::<usize>()?;
    let features = matches.value_of("features").unwrap_or("3").parse::<usize>()?;
    let seed = matches.value_of("seed").unwrap_or("42").parse::<u64>()?;
    let logistic = matches.value_of("regression") == Some("logistic");
    let dir = matches.value_of("dir").unwrap_or("./");

    if parties < 2 {
        return Err("at least two parties are required".into());
    }

    let mut rng = SmallRng::seed_from_u64(seed);
    info!(
        "Generating {} parties of {} rows, {} shared ids",
        parties, size, shared
    );
    let ids = gen::assign_ids(&mut rng, parties, size, shared);
    for (p, party_ids) in ids.iter().enumerate() {
        let data = gen::party_data(&mut rng, p, party_ids, features, logistic);
        let path = format!("{}/party_{}.csv", dir, p);
        common::files::write_vec_to_csv(&data.headers, &data.rows, &path)?;
        info!("File {} finished", path);
    }

    info!("Bye!");
    Ok(())
}
