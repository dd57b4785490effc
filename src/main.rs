// Copyright (c) 2019 King's College London created by the Software Development Team
// <http://soft-dev.org/>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, or the UPL-1.0 license <http://opensource.org/licenses/UPL>
// at your option. This file may not be copied, modified, or distributed except according to those
// terms.

use std::{env, process};

use getopts::Options;

use emperfect::Emperfect;

fn usage() -> ! {
    println!("Usage: emperfect <recipe>");
    process::exit(1);
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let matches = Options::new()
        .optflag("h", "help", "")
        .parse(&args[1..])
        .unwrap_or_else(|_| usage());
    if matches.opt_present("h") || matches.free.len() != 1 {
        usage();
    }
    let mut harness = Emperfect::new();
    harness.load_file(&matches.free[0]);
    harness.finalize();
}
