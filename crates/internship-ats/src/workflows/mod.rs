pub mod external_apply;
