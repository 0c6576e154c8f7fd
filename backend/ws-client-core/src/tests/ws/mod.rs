mod client;
mod defaults;
mod interfaces;
mod state;
mod write_gate;
