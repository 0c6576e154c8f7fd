mod config;
mod ws;
