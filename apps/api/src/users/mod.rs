// Admin account management: list, invite, promote/demote, disable, delete.

pub mod handlers;
