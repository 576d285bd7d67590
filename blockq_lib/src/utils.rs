pub(crate) mod deadline;
