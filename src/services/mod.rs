pub mod aggregator;
pub mod fetcher;
pub mod open_meteo;
pub mod openaq;
pub mod synth;
