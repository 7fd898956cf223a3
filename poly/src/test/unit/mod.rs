mod card;
mod parse;
