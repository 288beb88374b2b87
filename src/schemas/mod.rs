pub(crate) mod homework;
