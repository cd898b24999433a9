//! Memorable names for evaluation runs.

use rand::seq::SliceRandom;
use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "agile", "bold", "brave", "bright", "calm", "clever", "cosmic", "crisp", "daring", "eager",
    "fancy", "fierce", "gentle", "golden", "happy", "jolly", "keen", "lively", "lucky", "mellow",
    "mighty", "nimble", "noble", "polite", "proud", "quick", "quiet", "rapid", "shiny", "silent",
    "snowy", "steady", "sunny", "swift", "tidy", "vivid", "witty", "zesty",
];

const NOUNS: &[&str] = &[
    "badger", "beacon", "canyon", "comet", "cedar", "dolphin", "falcon", "fern", "glacier",
    "harbor", "heron", "island", "lagoon", "lantern", "maple", "meadow", "nebula", "orchid",
    "otter", "panda", "pebble", "pine", "quartz", "raven", "river", "robin", "sparrow", "summit",
    "thistle", "tiger", "tundra", "valley", "walrus", "willow", "zephyr",
];

/// A random `adjective-noun-NNN` run name.
pub fn generate_run_name() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("quick");
    let noun = NOUNS.choose(&mut rng).copied().unwrap_or("otter");
    format!("{}-{}-{:03}", adjective, noun, rng.gen_range(0..1000))
}
