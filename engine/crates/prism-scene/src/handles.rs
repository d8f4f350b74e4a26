slotmap::new_key_type! {
    pub struct MeshHandle;
    pub struct MaterialHandle;
    pub struct InstanceHandle;
    pub struct DdgiVolumeHandle;
}
