mod helpers;
mod lifecycle;
mod routing;
mod write_deadline;
