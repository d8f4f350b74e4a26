pub mod ddgi_volume_manager;
pub mod instance_manager;
pub mod material_manager;
pub mod mesh_manager;
pub mod named_data;
