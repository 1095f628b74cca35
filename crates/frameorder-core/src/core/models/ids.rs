use slotmap::new_key_type;

new_key_type! {
    pub struct SpinId;
    pub struct InteratomId;
    pub struct AlignId;
}
